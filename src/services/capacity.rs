//! Capacity planning for store onboarding. Pure arithmetic over deployment
//! limits; used as a pre-check before batch migrations.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityPlan {
    pub max_tenants: i64,
    pub available_capacity: i64,
}

/// How many stores the deployment can hold, given the schema-count ceiling
/// and the schemas reserved for system use (reference schema, templates,
/// scratch space).
pub fn plan(current_tenant_count: i64, max_schemas_allowed: i64, reserved_schemas: i64) -> CapacityPlan {
    let max_tenants = max_schemas_allowed - reserved_schemas;
    CapacityPlan {
        max_tenants,
        available_capacity: max_tenants - current_tenant_count,
    }
}

pub fn can_onboard(n: i64, current_tenant_count: i64, max_tenants: i64) -> bool {
    current_tenant_count + n <= max_tenants
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_subtracts_reserved_then_current() {
        let p = plan(30, 100, 5);
        assert_eq!(p.max_tenants, 95);
        assert_eq!(p.available_capacity, 65);
    }

    #[test]
    fn plan_can_go_negative_when_overcommitted() {
        let p = plan(120, 100, 5);
        assert_eq!(p.available_capacity, -25);
    }

    #[test]
    fn can_onboard_at_exact_boundary() {
        assert!(can_onboard(5, 90, 95));
        assert!(!can_onboard(6, 90, 95));
    }

    #[test]
    fn can_onboard_is_monotonic_in_n() {
        for n in 1..50 {
            if can_onboard(n, 40, 80) {
                assert!(can_onboard(n - 1, 40, 80));
            }
        }
    }

    #[test]
    fn report_field_names_are_stable() {
        let json = serde_json::to_value(plan(10, 100, 5)).unwrap();
        assert!(json.get("maxTenants").is_some());
        assert!(json.get("availableCapacity").is_some());
    }
}
