//! Result correlator: regroups flat provider results by resource and metric.

use std::collections::BTreeMap;

use crate::catalog::Vocabulary;
use crate::error::{Result, SvcMetricsError};
use crate::model::{QueryLookup, RawResultSeries};

/// resource name -> metric key -> series.
pub type Correlated = BTreeMap<String, BTreeMap<String, RawResultSeries>>;

/// Resolve each result id through `lookup` and file it under
/// `<metric>_<statistic>` for its resource.
///
/// An id missing from the lookup means the builder and dispatcher disagree
/// about what was submitted; that fails the whole correlation.
pub fn correlate(
    results: Vec<RawResultSeries>,
    lookup: &QueryLookup,
    vocabulary: &Vocabulary,
) -> Result<Correlated> {
    let mut out = Correlated::new();
    for series in results {
        let identity = lookup
            .get(&series.id)
            .ok_or_else(|| SvcMetricsError::UnresolvedQueryId(series.id.clone()))?;
        let key = vocabulary.metric_key(&identity.metric_name, &identity.statistic_name)?;
        out.entry(identity.resource_name.clone())
            .or_default()
            .insert(key, series);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::collections::BTreeSet;

    use super::*;
    use crate::catalog::{default_statistics, MetricCatalog};
    use crate::model::QueryIdentity;
    use crate::query::build_queries;

    fn series(id: &str, values: &[f64]) -> RawResultSeries {
        RawResultSeries {
            id: id.into(),
            values: values.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn cpu_average_lands_under_translated_key() {
        let resources: BTreeSet<String> = ["redis-node-0001".to_string()].into();
        let (queries, lookup) = build_queries(
            &resources,
            &MetricCatalog::redis(),
            &default_statistics(),
            300,
        );
        let cpu_avg = queries
            .iter()
            .find(|q| q.metric_name == "CPUUtilization" && q.statistic == "Average")
            .unwrap();

        let grouped = correlate(
            vec![series(&cpu_avg.id, &[12.5])],
            &lookup,
            &Vocabulary::redis(),
        )
        .unwrap();

        let node = &grouped["redis-node-0001"];
        assert_eq!(node.len(), 1);
        assert_eq!(node["cpu_utilization_avg"].values, vec![12.5]);
    }

    #[test]
    fn groups_every_result_by_resource() {
        let mut lookup = QueryLookup::new();
        for (id, node, stat) in [
            ("q_0", "node-a", "Average"),
            ("q_1", "node-a", "Maximum"),
            ("q_2", "node-b", "Average"),
        ] {
            lookup.insert(
                id.into(),
                QueryIdentity {
                    resource_name: node.into(),
                    metric_name: "Evictions".into(),
                    statistic_name: stat.into(),
                },
            );
        }

        let grouped = correlate(
            vec![series("q_2", &[1.0]), series("q_0", &[2.0]), series("q_1", &[3.0])],
            &lookup,
            &Vocabulary::redis(),
        )
        .unwrap();

        assert_eq!(grouped.len(), 2);
        let a: Vec<_> = grouped["node-a"].keys().cloned().collect();
        assert_eq!(a, vec!["evictions_avg", "evictions_max"]);
        assert_eq!(grouped["node-b"]["evictions_avg"].values, vec![1.0]);
    }

    #[test]
    fn unknown_result_id_is_fatal() {
        let err = correlate(
            vec![series("q_99", &[1.0])],
            &QueryLookup::new(),
            &Vocabulary::redis(),
        )
        .unwrap_err();
        assert!(matches!(err, SvcMetricsError::UnresolvedQueryId(id) if id == "q_99"));
    }
}
