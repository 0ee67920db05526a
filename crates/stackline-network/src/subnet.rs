//! Subnet tier planning.
//!
//! Subnets are carved consecutively out of the network block with a fixed
//! mask: the public subnet of every availability zone first, then the
//! private ones. Planning happens before any resource is declared, so a
//! block too small for the requested zones fails without side effects.

use std::fmt;

use serde::Serialize;
use stackline_common::error::{Result, StacklineError};

use crate::cidr::Ipv4Cidr;

/// Smallest subnet the provider accepts.
pub const MAX_SUBNET_MASK: u8 = 28;

/// Largest subnet the provider accepts.
pub const MIN_SUBNET_MASK: u8 = 16;

/// Routing tier of a subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SubnetTier {
    /// Routes to the internet gateway; hosts the load balancer and NAT.
    Public,
    /// Routes egress through the shared NAT gateway only.
    Private,
}

impl SubnetTier {
    /// Returns the tier label used in names and tags.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Public => "Public",
            Self::Private => "Private",
        }
    }
}

impl fmt::Display for SubnetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The planned placement of one subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubnetPlan {
    /// Routing tier.
    pub tier: SubnetTier,
    /// Zero-based availability-zone index.
    pub az_index: usize,
    /// Availability-zone name.
    pub availability_zone: String,
    /// Address block of the subnet.
    pub cidr: Ipv4Cidr,
}

impl SubnetPlan {
    /// Returns the logical name, e.g. `PrivateSubnet2`.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}Subnet{}", self.tier.label(), self.az_index + 1)
    }
}

/// Derives availability-zone names for a region (`us-east-1a`, `us-east-1b`, ...).
///
/// # Errors
///
/// Returns an error if more zones are requested than letters exist.
pub fn availability_zones(region: &str, count: u8) -> Result<Vec<String>> {
    if count > 26 {
        return Err(StacklineError::config(format!(
            "{count} availability zones requested, at most 26 can be named"
        )));
    }
    Ok((b'a'..b'a' + count)
        .map(|letter| format!("{region}{}", char::from(letter)))
        .collect())
}

/// Plans one public and one private subnet per availability zone.
///
/// # Errors
///
/// Returns a configuration error if `zones` is empty, the mask is outside
/// the accepted range, or the block cannot hold `2 * zones.len()` disjoint
/// subnets of that mask.
pub fn plan_subnets(vpc: &Ipv4Cidr, zones: &[String], mask: u8) -> Result<Vec<SubnetPlan>> {
    if zones.is_empty() {
        return Err(StacklineError::config(
            "at least one availability zone is required",
        ));
    }
    if !(MIN_SUBNET_MASK..=MAX_SUBNET_MASK).contains(&mask) {
        return Err(StacklineError::config(format!(
            "subnet mask /{mask} outside /{MIN_SUBNET_MASK}../{MAX_SUBNET_MASK}"
        )));
    }
    let needed = 2 * zones.len() as u64;
    let available = vpc.subnet_count(mask);
    if needed > available {
        return Err(StacklineError::config(format!(
            "cannot carve {needed} disjoint /{mask} subnets out of {vpc} (room for {available})"
        )));
    }

    let mut plans = Vec::with_capacity(zones.len() * 2);
    let mut index = 0u64;
    for tier in [SubnetTier::Public, SubnetTier::Private] {
        for (az_index, zone) in zones.iter().enumerate() {
            plans.push(SubnetPlan {
                tier,
                az_index,
                availability_zone: zone.clone(),
                cidr: vpc.subnet(mask, index)?,
            });
            index += 1;
        }
    }
    check_disjoint(vpc, &plans)?;
    tracing::debug!(vpc = %vpc, subnets = plans.len(), "subnets planned");
    Ok(plans)
}

/// Verifies that every subnet lies inside the block and no two overlap.
///
/// # Errors
///
/// Returns an invariant error naming the first offending subnet.
pub fn check_disjoint(vpc: &Ipv4Cidr, plans: &[SubnetPlan]) -> Result<()> {
    for (i, a) in plans.iter().enumerate() {
        if !vpc.contains(&a.cidr) {
            return Err(StacklineError::invariant(
                a.name(),
                format!("{} lies outside {vpc}", a.cidr),
            ));
        }
        if let Some(b) = plans[i + 1..].iter().find(|b| a.cidr.overlaps(&b.cidr)) {
            return Err(StacklineError::invariant(
                a.name(),
                format!("{} overlaps {} ({})", a.cidr, b.name(), b.cidr),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vpc(s: &str) -> Ipv4Cidr {
        s.parse().expect("valid cidr")
    }

    #[test]
    fn availability_zones_are_lettered() {
        let zones = availability_zones("us-east-1", 3).expect("zones");
        assert_eq!(zones, vec!["us-east-1a", "us-east-1b", "us-east-1c"]);
        assert!(availability_zones("us-east-1", 27).is_err());
    }

    #[test]
    fn two_zones_produce_public_then_private_blocks() {
        let zones = availability_zones("us-east-1", 2).expect("zones");
        let plans = plan_subnets(&vpc("10.0.0.0/16"), &zones, 24).expect("plan");
        let summary: Vec<(String, String)> = plans
            .iter()
            .map(|p| (p.name(), p.cidr.to_string()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("PublicSubnet1".to_string(), "10.0.0.0/24".to_string()),
                ("PublicSubnet2".to_string(), "10.0.1.0/24".to_string()),
                ("PrivateSubnet1".to_string(), "10.0.2.0/24".to_string()),
                ("PrivateSubnet2".to_string(), "10.0.3.0/24".to_string()),
            ]
        );
        assert_eq!(plans[2].availability_zone, "us-east-1a");
    }

    #[test]
    fn every_zone_count_yields_disjoint_tiers() {
        let block = vpc("10.0.0.0/16");
        for n in 1..=6u8 {
            let zones = availability_zones("eu-west-1", n).expect("zones");
            let plans = plan_subnets(&block, &zones, 24).expect("plan");
            let public = plans.iter().filter(|p| p.tier == SubnetTier::Public).count();
            let private = plans.iter().filter(|p| p.tier == SubnetTier::Private).count();
            assert_eq!((public, private), (usize::from(n), usize::from(n)));
            for (i, a) in plans.iter().enumerate() {
                for b in &plans[i + 1..] {
                    assert!(!a.cidr.overlaps(&b.cidr), "{} overlaps {}", a.cidr, b.cidr);
                }
            }
        }
    }

    #[test]
    fn block_too_small_fails_before_planning() {
        let zones = availability_zones("us-east-1", 3).expect("zones");
        let err = plan_subnets(&vpc("10.0.0.0/22"), &zones, 24).unwrap_err();
        assert!(err.to_string().contains("cannot carve 6"), "got: {err}");
    }

    #[test]
    fn zero_zones_is_rejected() {
        assert!(plan_subnets(&vpc("10.0.0.0/16"), &[], 24).is_err());
    }

    #[test]
    fn mask_out_of_range_is_rejected() {
        let zones = availability_zones("us-east-1", 1).expect("zones");
        assert!(plan_subnets(&vpc("10.0.0.0/16"), &zones, 30).is_err());
        assert!(plan_subnets(&vpc("10.0.0.0/8"), &zones, 12).is_err());
    }

    #[test]
    fn check_disjoint_flags_overlap() {
        let plans = vec![
            SubnetPlan {
                tier: SubnetTier::Public,
                az_index: 0,
                availability_zone: "a".into(),
                cidr: vpc("10.0.0.0/23"),
            },
            SubnetPlan {
                tier: SubnetTier::Private,
                az_index: 0,
                availability_zone: "a".into(),
                cidr: vpc("10.0.1.0/24"),
            },
        ];
        let err = check_disjoint(&vpc("10.0.0.0/16"), &plans).unwrap_err();
        assert!(matches!(err, StacklineError::Invariant { .. }));
    }
}
