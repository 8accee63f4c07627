pub mod services;
pub mod usercases;
