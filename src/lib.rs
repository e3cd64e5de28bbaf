//! cloud-init-seed library
//!
//! Generates first-boot provisioning seeds for cloud-init from one
//! configuration model:
//!
//! - a `#cloud-config` user-data document
//! - provider instance metadata (NoCloud, EC2, GCE, OpenStack ConfigDrive)
//! - an optional network configuration document
//! - an ISO 9660 image bundling them at the paths the provider expects
//!
//! # Example
//!
//! ```no_run
//! use cloud_init_seed::{SeedConfig, User};
//!
//! let mut config = SeedConfig::new_nocloud()?;
//! config.set_fqdn("web-1.example.com");
//! config.add_user(User::new("ops").with_password("secret"))?;
//! config.set_static_interface("aa:bb:cc:dd:ee:ff", "10.0.0.5/24", "10.0.0.1", &["8.8.8.8"]);
//!
//! let mut image = std::fs::File::create("seed.iso")?;
//! cloud_init_seed::image::assemble_image(&config, &mut image)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Design Principles
//!
//! - **Safety First**: No unsafe code (`#![forbid(unsafe_code)]`)
//! - **Deterministic**: identical models render byte-identical documents
//! - **Single writer**: a model is mutated by one caller, then rendered

pub mod config;
pub mod datasources;
pub mod image;
pub mod network;
pub mod seed;

mod error;

pub use datasources::DataSourceKind;
pub use error::{CloudInitError, ImageStage};
pub use seed::{SeedConfig, User};
