use tracing::error;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    if let Err(error) = mpesa_billing::observability::init_observability("billing") {
        eprintln!("Failed to initialise observability: {}", error);
        std::process::exit(1);
    }

    if let Err(error) = mpesa_billing::run().await {
        error!("Billing service exited with error: {:?}", error);
        std::process::exit(1);
    }
}
