//! Platform identifiers
//!
//! Discord snowflakes are 64-bit integers transmitted as strings. Each kind of
//! id gets its own newtype so a channel id can never be used as a user key.

use std::fmt;
use std::str::FromStr;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }

            /// SQLite stores integers as i64; snowflakes fit without loss.
            pub fn as_db(self) -> i64 {
                self.0 as i64
            }

            pub fn from_db(value: i64) -> Self {
                Self(value as u64)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<u64>().map(Self)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

snowflake!(
    /// A platform user
    UserId
);
snowflake!(
    /// A text channel
    ChannelId
);
snowflake!(
    /// A guild (server)
    GuildId
);
snowflake!(
    /// A message posted in a channel
    MessageId
);

impl UserId {
    /// Mention markup that pings the user
    pub fn mention(self) -> String {
        format!("<@{}>", self.0)
    }
}
