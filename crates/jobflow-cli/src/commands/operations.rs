//! Operations command - processing catalog with point costs

use anyhow::Result;
use jobflow_client::points::PointsSource;
use jobflow_client::{JobClient, Operation};

use crate::output::{OperationRow, OutputContext};

/// List the processing operations and what each one costs
pub async fn operations(client: &JobClient, refresh: bool, ctx: &OutputContext) -> Result<()> {
    let lookup = client.points(refresh).await;
    if lookup.source == PointsSource::Defaults {
        ctx.warn("Point costs unavailable from the server; showing defaults");
    }

    let rows: Vec<OperationRow> = Operation::ALL
        .iter()
        .map(|op| OperationRow {
            name: op.name().to_string(),
            endpoint: op.submit_path().to_string(),
            points: lookup
                .table
                .cost_of(*op)
                .map(|cost| cost.to_string())
                .unwrap_or_else(|| "-".to_string()),
            description: lookup
                .table
                .descriptions
                .get(op.points_key())
                .cloned()
                .unwrap_or_else(|| op.description().to_string()),
        })
        .collect();

    ctx.print(&rows);
    Ok(())
}
