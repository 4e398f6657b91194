use anyhow::Result;
use datafusion::arrow::array::{
    Array, ArrayRef, Float64Array, Int64Array, StringArray, StructArray,
};
use datafusion::arrow::datatypes::{DataType, Field};
use datafusion::prelude::*;
use lakewatch_enrichment::node_metrics::{
    ClusterEventColumns, NodeMetricRequest, get_node_info, with_node_metrics,
    with_state_durations,
};
use lakewatch_enrichment::time::{TimeResolution, duration_fields};
use std::sync::Arc;

use test_helpers::{collect_batch, column, column_names, init_test_logs, make_dataframe};

fn specs(cores: Vec<i64>, memory_gb: Vec<f64>) -> ArrayRef {
    Arc::new(StructArray::from(vec![
        (
            Arc::new(Field::new("cores", DataType::Int64, false)),
            Arc::new(Int64Array::from(cores)) as ArrayRef,
        ),
        (
            Arc::new(Field::new("memory_gb", DataType::Float64, false)),
            Arc::new(Float64Array::from(memory_gb)) as ArrayRef,
        ),
    ]))
}

/// downsize, upsize, terminating, running
fn cluster_events(ctx: &SessionContext) -> Result<DataFrame> {
    make_dataframe(
        ctx,
        vec![
            (
                "type",
                Arc::new(StringArray::from(vec![
                    "RESIZING",
                    "RESIZING",
                    "TERMINATING",
                    "RUNNING",
                ])) as ArrayRef,
            ),
            ("driver_specs", specs(vec![8; 4], vec![32.0; 4])),
            ("worker_specs", specs(vec![4; 4], vec![16.0; 4])),
            (
                "target_num_workers",
                Arc::new(Int64Array::from(vec![2, 6, 0, 3])) as ArrayRef,
            ),
            (
                "current_num_workers",
                Arc::new(Int64Array::from(vec![5, 3, 3, 3])) as ArrayRef,
            ),
            (
                "uptime_in_state_s",
                Arc::new(Float64Array::from(vec![10.0, 10.0, 50.0, 1.2345])) as ArrayRef,
            ),
        ],
    )
}

async fn evaluate(df: DataFrame, expr: Expr) -> Result<Vec<f64>> {
    let rb = collect_batch(df.select(vec![expr])?).await?;
    let values = rb
        .column(0)
        .as_any()
        .downcast_ref::<Float64Array>()
        .expect("metric should be a float");
    Ok(values.values().to_vec())
}

#[tokio::test]
async fn test_worker_metric_uses_applicable_worker_count() -> Result<()> {
    init_test_logs();
    let ctx = SessionContext::new();
    let events = cluster_events(&ctx)?;
    let columns = ClusterEventColumns::default();
    let cores = get_node_info(&events, &columns, "worker", "cores", false)?;
    let values = evaluate(events, cores).await?;
    // downsize counts the target workers, upsize the current ones
    assert_eq!(values, vec![8.0, 12.0, 0.0, 12.0]);
    Ok(())
}

#[tokio::test]
async fn test_time_weighted_metrics() -> Result<()> {
    let ctx = SessionContext::new();
    let events = cluster_events(&ctx)?;
    let columns = ClusterEventColumns::default();

    let worker = get_node_info(&events, &columns, "Worker", "cores", true)?;
    let values = evaluate(events.clone(), worker).await?;
    assert_eq!(values, vec![80.0, 120.0, 0.0, 14.81]);

    let driver = get_node_info(&events, &columns, "DRIVER", "cores", true)?;
    let values = evaluate(events.clone(), driver).await?;
    // terminating events yield 0 whatever the uptime
    assert_eq!(values, vec![80.0, 80.0, 0.0, 9.88]);

    let memory = get_node_info(&events, &columns, "driver", "memory_gb", false)?;
    let values = evaluate(events, memory).await?;
    assert_eq!(values, vec![32.0, 32.0, 0.0, 32.0]);
    Ok(())
}

#[tokio::test]
async fn test_node_info_rejects_invalid_arguments() -> Result<()> {
    let ctx = SessionContext::new();
    let events = cluster_events(&ctx)?;
    let columns = ClusterEventColumns::default();
    let err = get_node_info(&events, &columns, "executor", "cores", false).unwrap_err();
    assert!(err.is_invalid_argument());
    let err = get_node_info(&events, &columns, "worker", "gpus", false).unwrap_err();
    assert!(err.is_invalid_argument());
    let renamed = ClusterEventColumns {
        uptime_in_state_s: "uptime".into(),
        ..Default::default()
    };
    let err = get_node_info(&events, &renamed, "worker", "cores", true).unwrap_err();
    assert!(err.is_invalid_argument());
    // the uptime column is only needed for time weighted metrics
    assert!(get_node_info(&events, &renamed, "worker", "cores", false).is_ok());
    Ok(())
}

#[tokio::test]
async fn test_with_node_metrics() -> Result<()> {
    let ctx = SessionContext::new();
    let events = cluster_events(&ctx)?;
    let columns = ClusterEventColumns::default();
    let requests: Vec<NodeMetricRequest> = serde_json::from_str(
        r#"[
            {"node_type": "driver", "metric": "cores"},
            {"node_type": "worker", "metric": "memory_gb", "time_weighted": true}
        ]"#,
    )?;
    let rb = collect_batch(with_node_metrics(events.clone(), &columns, &requests)?).await?;
    let names = column_names(&rb);
    assert_eq!(names[names.len() - 2..], ["driver_cores", "worker_memory_gb_s"]);
    let memory: &Float64Array = column(&rb, "worker_memory_gb_s");
    assert_eq!(memory.value(0), 320.0);

    let invalid = vec![
        NodeMetricRequest::new("driver", "cores", false),
        NodeMetricRequest::new("gateway", "cores", false),
    ];
    let err = with_node_metrics(events, &columns, &invalid).unwrap_err();
    assert!(err.is_invalid_argument());
    Ok(())
}

#[tokio::test]
async fn test_with_state_durations() -> Result<()> {
    init_test_logs();
    let ctx = SessionContext::new();
    let events = make_dataframe(
        &ctx,
        vec![
            (
                "cluster_id",
                Arc::new(StringArray::from(vec!["c1", "c2", "c1", "c1"])) as ArrayRef,
            ),
            (
                "timestamp",
                Arc::new(Int64Array::from(vec![0, 5_000, 25_000, 10_000])) as ArrayRef,
            ),
            (
                "uptime_in_state_s",
                Arc::new(Float64Array::from(vec![-1.0; 4])) as ArrayRef,
            ),
        ],
    )?;
    let columns = ClusterEventColumns::default();
    let durations = with_state_durations(events, &columns)?.sort(vec![
        col("cluster_id").sort(true, false),
        col("timestamp").sort(true, false),
    ])?;
    let rb = collect_batch(durations).await?;
    assert_eq!(
        column_names(&rb),
        vec!["cluster_id", "timestamp", "state_duration", "uptime_in_state_s"]
    );
    let uptime: &Float64Array = column(&rb, "uptime_in_state_s");
    assert_eq!(uptime.value(0), 10.0);
    assert_eq!(uptime.value(1), 15.0);
    assert!(uptime.is_null(2));
    assert!(uptime.is_null(3));

    let duration: &StructArray = column(&rb, "state_duration");
    let seconds = duration
        .column_by_name(duration_fields::DURATION_SEC)
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .expect("durationSec");
    assert_eq!(seconds.value(0), 10);
    assert_eq!(seconds.value(1), 15);
    assert!(seconds.is_null(3));
    Ok(())
}

#[test]
fn test_cluster_event_columns_config() -> Result<()> {
    let columns: ClusterEventColumns =
        serde_json::from_str(r#"{"event_type": "kind", "timestamp_resolution": "second"}"#)?;
    assert_eq!(columns.event_type, "kind");
    assert_eq!(columns.timestamp_resolution, TimeResolution::Second);
    assert_eq!(columns.worker_specs, "worker_specs");
    Ok(())
}
