//! Property tests for key resolution and statement binding.

use proptest::prelude::*;
use std::collections::BTreeSet;

use upsert_core::{
    build, resolve_constraint, ColumnDescriptor, ScalarType, SqlValue, TableDescriptor,
    UniqueConstraint, UpsertRequest, ValidationError,
};

const COLUMNS: [&str; 6] = ["id", "serialNumber", "make", "model", "weight", "note"];

fn column(name: &str) -> ColumnDescriptor {
    ColumnDescriptor {
        name: name.to_string(),
        sql_type: "text".to_string(),
        scalar: ScalarType::Text,
        nullable: true,
        default: None,
        writable: true,
    }
}

fn arb_column_set() -> impl Strategy<Value = BTreeSet<&'static str>> {
    prop::sample::subsequence(COLUMNS.to_vec(), 1..=3).prop_map(|v| v.into_iter().collect())
}

fn arb_table() -> impl Strategy<Value = TableDescriptor> {
    prop::collection::vec(arb_column_set(), 1..4).prop_map(|sets| TableDescriptor {
        schema: "public".to_string(),
        name: "bikes".to_string(),
        columns: COLUMNS.iter().map(|c| column(c)).collect(),
        constraints: sets
            .into_iter()
            .enumerate()
            .map(|(i, set)| UniqueConstraint {
                name: format!("bikes_key_{}", i),
                columns: set.into_iter().map(str::to_string).collect(),
                primary: i == 0,
            })
            .collect(),
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// A key set resolves iff exactly one constraint has that column set.
    #[test]
    fn prop_resolve_requires_exact_unique_match(
        table in arb_table(),
        keys in prop::sample::subsequence(COLUMNS.to_vec(), 0..=4),
    ) {
        let keys: BTreeSet<&str> = keys.into_iter().collect();
        let exact = table
            .constraints
            .iter()
            .filter(|c| c.column_set() == keys)
            .count();

        match resolve_constraint(&table, &keys) {
            Ok(constraint) => {
                prop_assert_eq!(exact, 1);
                prop_assert_eq!(constraint.column_set(), keys);
            }
            Err(ValidationError::AmbiguousKey { matches, .. }) => {
                prop_assert_ne!(exact, 1);
                prop_assert_eq!(matches, exact);
            }
            Err(other) => prop_assert!(false, "unexpected error: {:?}", other),
        }
    }

    /// Binding always yields the template's full parameter list, whichever
    /// columns the request supplies.
    #[test]
    fn prop_bind_shape_is_fixed(
        table in arb_table(),
        supplied in prop::sample::subsequence(COLUMNS.to_vec(), 0..=6),
        key_value in "[a-z0-9]{1,8}",
        input_value in "[a-z0-9]{1,8}",
    ) {
        let constraint = table.constraints[0].clone();
        let template = match build(&table, &constraint) {
            Ok(template) => template,
            Err(err) => {
                prop_assert!(false, "build failed: {:?}", err);
                return Ok(());
            }
        };

        // Other constraints with the same column set make the key ambiguous
        // at resolve time, but bind does not care.
        let mut request = UpsertRequest::new();
        for key in &constraint.columns {
            request = request.with_where(key.clone(), key_value.as_str());
        }
        for column in &supplied {
            request = request.with_input(*column, input_value.as_str());
        }

        let bound = match template.bind(&table, &request) {
            Ok(bound) => bound,
            Err(err) => {
                prop_assert!(false, "bind failed: {:?}", err);
                return Ok(());
            }
        };

        let key_count = constraint.columns.len();
        prop_assert_eq!(template.param_count(), key_count + 2 * (COLUMNS.len() - key_count));
        prop_assert_eq!(bound.params.len(), template.param_count());

        for bound_column in &bound.columns {
            if bound_column.key {
                // Where values win over input values.
                prop_assert_eq!(&bound_column.value, &SqlValue::from(key_value.as_str()));
            } else {
                let expected = supplied.contains(&bound_column.column.as_str());
                prop_assert_eq!(bound_column.supplied, expected);
            }
        }
    }
}
