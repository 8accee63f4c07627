pub mod billing_worker;
