//! Amazon Resource Names.

use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Partition used for ARNs synthesized from resources that have none.
pub const FAKE_PARTITION: &str = "aws";
/// Region used for synthesized ARNs.
pub const FAKE_REGION: &str = "us-east-1";
/// Account used for synthesized ARNs.
pub const FAKE_ACCOUNT: &str = "123456789012";

static ARN_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_arn_regex() -> &'static Regex {
    ARN_REGEX.get_or_init(|| {
        Regex::new(r"^arn:([^:]+):([^:]+):([^:]*):([^:]*):(.+)$").expect("Invalid Regex")
    })
}

/// A parsed ARN: `arn:partition:service:region:account:resource`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Arn {
    pub partition: String,
    pub service: String,
    pub region: String,
    pub account_id: String,
    /// Resource path, e.g. `loadbalancer/app/name/id` or `security-group/sg-1`.
    pub resource: String,
}

impl Arn {
    /// ARN with the fixed fake partition, region and account.
    pub fn synthesize(service: &str, resource: &str) -> Self {
        Arn {
            partition: FAKE_PARTITION.to_string(),
            service: service.to_string(),
            region: FAKE_REGION.to_string(),
            account_id: FAKE_ACCOUNT.to_string(),
            resource: resource.to_string(),
        }
    }

    /// Last path segment of the resource, usually the id or name.
    pub fn resource_name(&self) -> &str {
        self.resource
            .rsplit('/')
            .next()
            .unwrap_or(self.resource.as_str())
    }
}

impl FromStr for Arn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let caps = get_arn_regex()
            .captures(s)
            .ok_or_else(|| Error::Config(format!("invalid ARN {s:?}")))?;
        Ok(Arn {
            partition: caps[1].to_string(),
            service: caps[2].to_string(),
            region: caps[3].to_string(),
            account_id: caps[4].to_string(),
            resource: caps[5].to_string(),
        })
    }
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arn:{}:{}:{}:{}:{}",
            self.partition, self.service, self.region, self.account_id, self.resource
        )
    }
}
