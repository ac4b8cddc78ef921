use proptest::prelude::*;

use forecast_pipeline::data::service::leading_zeros;
use forecast_pipeline::sharded::shard_for;
use forecast_pipeline::PipelineError;

fn host_names(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("algo-{i}")).collect()
}

proptest! {
    #[test]
    fn shards_tile_the_prefix_in_host_order(n in 1usize..16, total in 0usize..10_000) {
        let hosts = host_names(n);
        let shards: Vec<_> = hosts
            .iter()
            .map(|h| shard_for(h, &hosts, total).unwrap())
            .collect();

        let mut cursor = 0;
        for shard in &shards {
            prop_assert_eq!(shard.start, cursor);
            prop_assert_eq!(shard.len(), total / n);
            cursor = shard.end;
        }
        prop_assert_eq!(cursor, total - total % n);
    }

    #[test]
    fn unknown_host_is_rejected(n in 1usize..8, total in 0usize..1_000) {
        let hosts = host_names(n);
        let err = shard_for("algo-0", &hosts, total).unwrap_err();
        prop_assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn leading_zeros_stops_at_first_nonzero(zeros in 0usize..50, tail in prop::collection::vec(0.5f64..10.0, 0..50)) {
        let mut values = vec![0.0; zeros];
        values.extend_from_slice(&tail);
        prop_assert_eq!(leading_zeros(&values), zeros);
    }
}

#[test]
fn empty_host_list_is_rejected() {
    assert!(matches!(shard_for("algo-1", &[], 10), Err(PipelineError::Config(_))));
}
