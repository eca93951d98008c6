//! Value objects - immutable types that represent domain concepts

mod fanout;
mod retry;
mod snowflake;
mod tx_state;

pub use fanout::{FanoutMode, DEFAULT_READ_FANOUT_THRESHOLD};
pub use retry::RetryPolicy;
pub use snowflake::{Snowflake, SnowflakeGenerator, SnowflakeParseError};
pub use tx_state::{LocalTxState, Resolution};
