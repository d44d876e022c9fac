/// walletfeed - multi-chain wallet activity engine
///
/// Unifies TON and TRON activity history into one ordered, gap-free feed per
/// account, and reconciles optimistic local records of submitted transfers
/// with the versions the chains later confirm.

pub mod account;
pub mod activity;
pub mod api;
pub mod chain;
pub mod cli_app;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod filter;
pub mod initial_load;
pub mod local;
pub mod merge;
mod pagination;
pub mod pending;
pub mod reducers;
pub mod state;
pub mod storage;
pub mod throttle;
pub mod tokens;

pub use account::{Account, Network};
pub use activity::{Activity, ActivityStatus};
pub use chain::{ChainAdapter, ChainRegistry, FixtureChain};
pub use config::Config;
pub use engine::ActivityEngine;
pub use error::{Result, WalletError};
pub use events::EngineEvent;
pub use state::StreamKey;
pub use tokens::Chain;
