use crate::dfext::column_ref::{ColumnRef, all_columns};
use crate::error::{Error, Result};
use crate::time::{TimeResolution, subtract_time};
use datafusion::arrow::datatypes::DataType;
use datafusion::functions::core::expr_ext::FieldAccessor;
use datafusion::functions::expr_fn::round;
use datafusion::functions_window::expr_fn::lead;
use datafusion::logical_expr::ExprFunctionExt;
use datafusion::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, instrument};

pub const TERMINATING: &str = "TERMINATING";
pub const RESIZING: &str = "RESIZING";

const NEXT_TIMESTAMP: &str = "__next_state_timestamp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Driver,
    Worker,
}

impl FromStr for NodeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("driver") {
            Ok(NodeType::Driver)
        } else if s.eq_ignore_ascii_case("worker") {
            Ok(NodeType::Worker)
        } else {
            Err(Error::invalid_argument(format!(
                "node type must be either 'driver' or 'worker', got '{s}'"
            )))
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeType::Driver => write!(f, "driver"),
            NodeType::Worker => write!(f, "worker"),
        }
    }
}

/// Names of the cluster event columns read by the node metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterEventColumns {
    pub event_type: String,
    /// struct holding the driver node type specification
    pub driver_specs: String,
    /// struct holding the worker node type specification
    pub worker_specs: String,
    pub target_num_workers: String,
    pub current_num_workers: String,
    /// seconds spent in the state started by the event
    pub uptime_in_state_s: String,
    pub timestamp: String,
    pub timestamp_resolution: TimeResolution,
    pub cluster_id: String,
    /// duration record struct added by [`with_state_durations`]
    pub state_duration: String,
}

impl Default for ClusterEventColumns {
    fn default() -> Self {
        Self {
            event_type: "type".into(),
            driver_specs: "driver_specs".into(),
            worker_specs: "worker_specs".into(),
            target_num_workers: "target_num_workers".into(),
            current_num_workers: "current_num_workers".into(),
            uptime_in_state_s: "uptime_in_state_s".into(),
            timestamp: "timestamp".into(),
            timestamp_resolution: TimeResolution::Milli,
            cluster_id: "cluster_id".into(),
            state_duration: "state_duration".into(),
        }
    }
}

/// One derived metric column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetricRequest {
    pub node_type: String,
    pub metric: String,
    #[serde(default)]
    pub time_weighted: bool,
}

impl NodeMetricRequest {
    pub fn new(node_type: &str, metric: &str, time_weighted: bool) -> Self {
        Self {
            node_type: node_type.into(),
            metric: metric.into(),
            time_weighted,
        }
    }
}

fn require_spec_field(specs: &ColumnRef, metric: &str) -> Result<()> {
    match specs.data_type() {
        DataType::Struct(fields) if fields.iter().any(|f| f.name() == metric) => Ok(()),
        DataType::Struct(_) => Err(Error::invalid_argument(format!(
            "{} has no field {metric}",
            specs.name()
        ))),
        other => Err(Error::invalid_argument(format!(
            "{} should be a struct, got {other}",
            specs.name()
        ))),
    }
}

/// Builds the expression of a per-node resource metric over cluster events.
///
/// Worker metrics are scaled by the number of workers that stay up: the target count while
/// downsizing, the current count otherwise. Terminating events always yield 0. When time
/// weighted, the metric is multiplied by the seconds spent in the state. Values are rounded to
/// two decimals and the column is named `{node}_{metric}`, with a `_s` suffix when time
/// weighted.
pub fn get_node_info(
    events: &DataFrame,
    columns: &ClusterEventColumns,
    node_type: &str,
    metric: &str,
    time_weighted: bool,
) -> Result<Expr> {
    let node_type: NodeType = node_type.parse()?;
    let schema = events.schema();
    let event_type = ColumnRef::resolve(schema, &columns.event_type)?.expr();
    let specs = match node_type {
        NodeType::Driver => ColumnRef::resolve(schema, &columns.driver_specs)?,
        NodeType::Worker => ColumnRef::resolve(schema, &columns.worker_specs)?,
    };
    require_spec_field(&specs, metric)?;
    let per_node = specs.expr().field(metric);
    let base_metric = match node_type {
        NodeType::Driver => per_node,
        NodeType::Worker => {
            let target = ColumnRef::resolve(schema, &columns.target_num_workers)?.expr();
            let current = ColumnRef::resolve(schema, &columns.current_num_workers)?.expr();
            let downsizing = event_type
                .clone()
                .eq(lit(RESIZING))
                .and(target.clone().lt(current.clone()));
            per_node * when(downsizing, target).otherwise(current)?
        }
    };
    let (value, name) = if time_weighted {
        let uptime = ColumnRef::resolve(schema, &columns.uptime_in_state_s)?.expr();
        (base_metric * uptime, format!("{node_type}_{metric}_s"))
    } else {
        (base_metric, format!("{node_type}_{metric}"))
    };
    Ok(when(event_type.eq(lit(TERMINATING)), lit(0.0_f64))
        .otherwise(round(vec![value, lit(2_i64)]))?
        .alias(name))
}

/// Appends one column per request, after validating all of them.
#[instrument(skip_all)]
pub fn with_node_metrics(
    events: DataFrame,
    columns: &ClusterEventColumns,
    requests: &[NodeMetricRequest],
) -> Result<DataFrame> {
    let derived = requests
        .iter()
        .map(|r| get_node_info(&events, columns, &r.node_type, &r.metric, r.time_weighted))
        .collect::<Result<Vec<_>>>()?;
    debug!("deriving {} node metrics", derived.len());
    let mut projection: Vec<Expr> = all_columns(&events).iter().map(|c| c.expr()).collect();
    projection.extend(derived);
    Ok(events.select(projection)?)
}

/// Derives how long each cluster stayed in the state started by an event.
///
/// The state ends with the next event of the same cluster; the last event of a cluster has a
/// null duration. Adds the duration record and replaces the uptime column with the duration in
/// fractional seconds.
#[instrument(skip_all)]
pub fn with_state_durations(events: DataFrame, columns: &ClusterEventColumns) -> Result<DataFrame> {
    let cluster = ColumnRef::resolve(events.schema(), &columns.cluster_id)?;
    let timestamp = ColumnRef::resolve(events.schema(), &columns.timestamp)?;
    let kept: Vec<ColumnRef> = all_columns(&events)
        .into_iter()
        .filter(|c| c.name() != columns.uptime_in_state_s && c.name() != columns.state_duration)
        .collect();
    let next_timestamp = lead(timestamp.expr(), Some(1), None)
        .partition_by(vec![cluster.expr()])
        .order_by(vec![timestamp.expr().sort(true, true)])
        .build()?
        .alias(NEXT_TIMESTAMP);
    let windowed = events.window(vec![next_timestamp])?;

    let seconds_per_unit = match columns.timestamp_resolution {
        TimeResolution::Milli => 1000.0_f64,
        TimeResolution::Second => 1.0_f64,
    };
    let elapsed = cast(ident(NEXT_TIMESTAMP), DataType::Int64)
        - cast(timestamp.expr(), DataType::Int64);
    let uptime = cast(elapsed, DataType::Float64) / lit(seconds_per_unit);
    let duration = subtract_time(
        timestamp.expr(),
        ident(NEXT_TIMESTAMP),
        columns.timestamp_resolution,
    )?;
    let mut projection: Vec<Expr> = kept.iter().map(|c| c.expr()).collect();
    projection.push(duration.alias(&columns.state_duration));
    projection.push(uptime.alias(&columns.uptime_in_state_s));
    Ok(windowed.select(projection)?)
}
