//! CloudFormation template synthesis for the Space Invaders game backend.
//!
//! ```no_run
//! let config = invaders_cfn::AppConfig::load("invaders.toml")?;
//! let template = invaders_cfn::synthesize(&config)?;
//! println!("{}", template.to_yaml()?);
//! # Ok::<(), invaders_cfn::Error>(())
//! ```

pub mod cfn;
pub mod config;
pub mod error;
pub mod layers;
pub mod regions;
pub mod resources;
pub mod stack;

#[cfg(feature = "deploy")]
pub mod deploy;

#[cfg(test)]
mod module_testing;

pub use cfn::Template;
pub use config::AppConfig;
pub use error::{Error, Result};
pub use stack::{stack_name, synthesize};
