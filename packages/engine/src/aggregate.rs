//! Overlap-weighted aggregation and pivoting.
//!
//! For each estimate variable declared by the table's catalog, the
//! weighted sum `Σ overlap_i × value_i` runs over the geographies
//! present in both the overlap set and the fetched values (an inner
//! join on geography id: the ACS omits geographies with no reported
//! data for a table, and that must not raise). The sum is NOT
//! renormalized by total overlap weight: the result approximates the
//! portion of the quantity falling inside the circle, not a weighted
//! average of a rate.

use std::collections::BTreeMap;

use census_map_models::{AggregateRow, Overlap, PivotRow, PivotTable, ValueTable, VariableMeta};

/// Aggregates one (point, table) pair into one row per estimate
/// variable.
///
/// Columns are declared by the catalog (only estimate variables are
/// surfaced), never inferred from the payload by runtime coercion.
/// A variable whose every contributing cell is missing or non-numeric
/// is dropped entirely, not emitted as zero.
#[must_use]
pub fn aggregate(
    point_name: &str,
    catalog: &BTreeMap<String, VariableMeta>,
    overlaps: &[Overlap],
    values: &ValueTable,
) -> Vec<AggregateRow> {
    let mut rows = Vec::new();

    for (var_id, meta) in catalog {
        if !meta.is_estimate {
            continue;
        }

        let mut sum = 0.0;
        let mut contributed = false;

        for overlap in overlaps {
            let Some(raw) = values.value(&overlap.geoidfq, var_id) else {
                continue;
            };
            let Ok(value) = raw.parse::<f64>() else {
                continue;
            };
            sum += overlap.percent_overlap * value;
            contributed = true;
        }

        if contributed {
            rows.push(AggregateRow {
                point_name: point_name.to_string(),
                var_id: var_id.clone(),
                label: meta.label.clone(),
                value: sum,
            });
        }
    }

    rows
}

/// Pivots aggregates into one row per point name, one column per
/// variable label.
///
/// Column order is first-seen label order; row order is first-seen
/// point order. On duplicate (point, label) pairs across tables the
/// first value wins.
#[must_use]
pub fn pivot(aggregates: &[AggregateRow]) -> PivotTable {
    let mut columns: Vec<String> = Vec::new();
    let mut point_order: Vec<String> = Vec::new();
    let mut cells: BTreeMap<(String, String), f64> = BTreeMap::new();

    for row in aggregates {
        if !columns.contains(&row.label) {
            columns.push(row.label.clone());
        }
        if !point_order.contains(&row.point_name) {
            point_order.push(row.point_name.clone());
        }
        cells
            .entry((row.point_name.clone(), row.label.clone()))
            .or_insert(row.value);
    }

    let rows = point_order
        .into_iter()
        .map(|point_name| {
            let values = columns
                .iter()
                .map(|label| cells.get(&(point_name.clone(), label.clone())).copied())
                .collect();
            PivotRow { point_name, values }
        })
        .collect();

    PivotTable { columns, rows }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with(vars: &[(&str, &str, bool)]) -> BTreeMap<String, VariableMeta> {
        vars.iter()
            .map(|(id, label, is_estimate)| {
                (
                    (*id).to_string(),
                    VariableMeta {
                        label: (*label).to_string(),
                        is_estimate: *is_estimate,
                    },
                )
            })
            .collect()
    }

    fn overlap(geoidfq: &str, pct: f64) -> Overlap {
        Overlap {
            geoidfq: geoidfq.to_string(),
            percent_overlap: pct,
            centroid_distance_m: 0.0,
        }
    }

    fn values_with(cells: &[(&str, &str, &str)]) -> ValueTable {
        let mut table = ValueTable::default();
        for (geoidfq, var_id, value) in cells {
            if !table.columns.contains(&(*var_id).to_string()) {
                table.columns.push((*var_id).to_string());
            }
            table
                .rows
                .entry((*geoidfq).to_string())
                .or_default()
                .insert((*var_id).to_string(), (*value).to_string());
        }
        table
    }

    #[test]
    fn weighted_sum_matches_reference_example() {
        // overlaps 0.5 and 0.25, values 100 and 200 -> 0.5*100 + 0.25*200 = 100
        let catalog = catalog_with(&[("B01001_001E", "Estimate Total:", true)]);
        let overlaps = vec![overlap("g1", 0.5), overlap("g2", 0.25)];
        let values = values_with(&[("g1", "B01001_001E", "100"), ("g2", "B01001_001E", "200")]);

        let rows = aggregate("Point 1", &catalog, &overlaps, &values);

        assert_eq!(rows.len(), 1);
        assert!((rows[0].value - 100.0).abs() < f64::EPSILON);
        assert_eq!(rows[0].var_id, "B01001_001E");
        assert_eq!(rows[0].label, "Estimate Total:");
        assert_eq!(rows[0].point_name, "Point 1");
    }

    #[test]
    fn full_overlap_passes_values_through_unmodified() {
        let catalog = catalog_with(&[
            ("B01001_001E", "Total", true),
            ("B01001_002E", "Male", true),
        ]);
        let overlaps = vec![overlap("g1", 1.0)];
        let values = values_with(&[("g1", "B01001_001E", "1181"), ("g1", "B01001_002E", "540")]);

        let rows = aggregate("Point 1", &catalog, &overlaps, &values);

        assert_eq!(rows.len(), 2);
        assert!((rows[0].value - 1181.0).abs() < f64::EPSILON);
        assert!((rows[1].value - 540.0).abs() < f64::EPSILON);
    }

    #[test]
    fn inner_join_ignores_one_sided_geographies() {
        let catalog = catalog_with(&[("B01001_001E", "Total", true)]);
        // g2 has overlap but no values; g3 has values but no overlap
        let overlaps = vec![overlap("g1", 0.5), overlap("g2", 0.5)];
        let values = values_with(&[("g1", "B01001_001E", "100"), ("g3", "B01001_001E", "999")]);

        let rows = aggregate("Point 1", &catalog, &overlaps, &values);

        assert_eq!(rows.len(), 1);
        assert!((rows[0].value - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn non_estimate_variables_excluded() {
        let catalog = catalog_with(&[
            ("B01001_001E", "Total", true),
            ("B01001_001M", "Margin", false),
        ]);
        let overlaps = vec![overlap("g1", 1.0)];
        let values = values_with(&[("g1", "B01001_001E", "100"), ("g1", "B01001_001M", "12")]);

        let rows = aggregate("Point 1", &catalog, &overlaps, &values);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].var_id, "B01001_001E");
    }

    #[test]
    fn all_missing_variable_dropped_not_zero() {
        let catalog = catalog_with(&[
            ("B01001_001E", "Total", true),
            ("B01001_002E", "Male", true),
        ]);
        let overlaps = vec![overlap("g1", 1.0)];
        // 002E present but non-numeric (ACS annotation placeholder)
        let values = values_with(&[("g1", "B01001_001E", "100"), ("g1", "B01001_002E", "-")]);

        let rows = aggregate("Point 1", &catalog, &overlaps, &values);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].var_id, "B01001_001E");
    }

    #[test]
    fn empty_overlaps_produce_no_rows() {
        let catalog = catalog_with(&[("B01001_001E", "Total", true)]);
        let values = values_with(&[("g1", "B01001_001E", "100")]);

        assert!(aggregate("Point 1", &catalog, &[], &values).is_empty());
    }

    #[test]
    fn pivot_one_row_per_point_one_column_per_label() {
        let aggregates = vec![
            AggregateRow {
                point_name: "Home".to_string(),
                var_id: "B01001_001E".to_string(),
                label: "Total".to_string(),
                value: 100.0,
            },
            AggregateRow {
                point_name: "Home".to_string(),
                var_id: "B19013_001E".to_string(),
                label: "Median income".to_string(),
                value: 55_000.0,
            },
            AggregateRow {
                point_name: "Work".to_string(),
                var_id: "B01001_001E".to_string(),
                label: "Total".to_string(),
                value: 250.0,
            },
        ];

        let table = pivot(&aggregates);

        assert_eq!(table.columns, vec!["Total", "Median income"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].point_name, "Home");
        assert_eq!(table.rows[0].values, vec![Some(100.0), Some(55_000.0)]);
        assert_eq!(table.rows[1].point_name, "Work");
        // Work has no median-income aggregate -> hole, not zero
        assert_eq!(table.rows[1].values, vec![Some(250.0), None]);
    }

    #[test]
    fn pivot_first_value_wins_on_duplicate_labels() {
        let aggregates = vec![
            AggregateRow {
                point_name: "Home".to_string(),
                var_id: "B01001_001E".to_string(),
                label: "Total".to_string(),
                value: 100.0,
            },
            AggregateRow {
                point_name: "Home".to_string(),
                var_id: "B99999_001E".to_string(),
                label: "Total".to_string(),
                value: 999.0,
            },
        ];

        let table = pivot(&aggregates);

        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].values, vec![Some(100.0)]);
    }

    #[test]
    fn pivot_skips_points_with_no_aggregates() {
        // A point with zero intersecting geographies contributes no
        // aggregates, so it must produce no row (and no error).
        let aggregates = vec![AggregateRow {
            point_name: "Work".to_string(),
            var_id: "B01001_001E".to_string(),
            label: "Total".to_string(),
            value: 250.0,
        }];

        let table = pivot(&aggregates);

        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].point_name, "Work");
    }

    #[test]
    fn pivot_of_nothing_is_empty() {
        let table = pivot(&[]);
        assert!(table.columns.is_empty());
        assert!(table.rows.is_empty());
    }
}
