//! # ViettelPay Partner Client
//!
//! Application layer over the [`protocol`] envelope engine: configuration,
//! the SOAP transport and typed partner API calls.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use viettelpay::api::{generate_order_id, CheckAccount, PartnerApi};
//! use viettelpay::config::Config;
//! use viettelpay::soap::SoapTransport;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut config = Config::load_default()?;
//! config.apply_env_overrides();
//! config.validate()?;
//!
//! let transport = SoapTransport::new(config.endpoint.base_url.clone(), config.timeout())?;
//! let api = PartnerApi::new(
//!     Arc::new(config.load_key_store()?),
//!     transport,
//!     config.processor_options(),
//! )?;
//!
//! let outcome = api
//!     .check_account(
//!         &generate_order_id(),
//!         &[CheckAccount {
//!             msisdn: "84365232398".to_string(),
//!             customer_name: "Nguyen Van A".to_string(),
//!         }],
//!     )
//!     .await?;
//! println!("{:?}", outcome.result);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: TOML configuration with environment overrides
//! - [`soap`]: SOAP/HTTP transport
//! - [`api`]: Check account, disbursement and query calls

pub mod api;
pub mod config;
pub mod soap;

pub use api::{
    generate_order_id, CheckAccount, CheckAccountResult, Disbursement, DisbursementResult,
    PartnerApi,
};
pub use config::{Config, ConfigError};
pub use soap::{SoapError, SoapTransport};
