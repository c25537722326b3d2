//! Per-instance-type capacity tables.
//!
//! The provider does not expose core or local-disk counts through the
//! API used here, so both are fixed tables with a logged fallback for
//! unknown types.

use tracing::warn;

/// CPU cores for an instance type. Unknown types assume 2.
pub fn cores(instance_type: &str) -> u32 {
    match instance_type {
        "m1.small" => 1,
        "m1.large" => 2,
        "m1.xlarge" => 4,
        "t1.micro" => 1,
        "c1.medium" => 2,
        "c1.xlarge" => 8,
        "m2.xlarge" => 2,
        "m2.2xlarge" => 4,
        "m2.4xlarge" => 8,
        "cc1.4xlarge" => 8,
        "cc2.8xlarge" => 16,
        "cg1.4xlarge" => 8,
        _ => {
            warn!(%instance_type, "unknown instance type, assuming 2 cores");
            2
        }
    }
}

/// Local (ephemeral) disks for an instance type. Unknown types assume 1.
pub fn local_disks(instance_type: &str) -> u32 {
    match instance_type {
        "m1.small" => 1,
        "m1.medium" => 1,
        "m1.large" => 2,
        "m1.xlarge" => 4,
        "t1.micro" => 1,
        "c1.medium" => 1,
        "c1.xlarge" => 4,
        "m2.xlarge" => 1,
        "m2.2xlarge" => 1,
        "m2.4xlarge" => 2,
        "cc1.4xlarge" => 2,
        "cc2.8xlarge" => 4,
        "cg1.4xlarge" => 2,
        _ => {
            warn!(%instance_type, "unknown instance type, assuming 1 local disk");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_types() {
        assert_eq!(cores("m1.xlarge"), 4);
        assert_eq!(cores("cc2.8xlarge"), 16);
        assert_eq!(local_disks("m1.large"), 2);
        assert_eq!(local_disks("c1.xlarge"), 4);
    }

    #[test]
    fn unknown_types_fall_back() {
        assert_eq!(cores("z9.mega"), 2);
        assert_eq!(local_disks("z9.mega"), 1);
    }
}
