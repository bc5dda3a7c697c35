//! JSON shapes printed by the sub-commands.

use cosm_core::geojson::encode_geometry;
use cosm_core::FeatureEnvelope;
use cosm_replica::{FeatureCursor, NearestLine, SyncOutcome, TargetNode};
use geo::Rect;
use serde_json::{Map, Value, json};

use crate::CliError;

pub(crate) fn bbox(bbox: &Rect<f64>) -> Value {
    json!([bbox.min().x, bbox.min().y, bbox.max().x, bbox.max().y])
}

pub(crate) fn sync_outcome(outcome: &SyncOutcome) -> Value {
    match outcome {
        SyncOutcome::AlreadyCovered => json!({ "status": "already_covered" }),
        SyncOutcome::Fetched {
            envelope,
            points,
            lines,
        } => json!({
            "status": "fetched",
            "envelope": bbox(envelope),
            "points": points,
            "lines": lines,
        }),
        SyncOutcome::SkippedTooLarge { area_deg2 } => json!({
            "status": "skipped_too_large",
            "area_deg2": area_deg2,
        }),
    }
}

/// Render a cursor as a GeoJSON `FeatureCollection`.
///
/// Rows that fail to parse are skipped so one bad row does not hide the
/// rest of the window.
pub(crate) fn feature_collection(cursor: &FeatureCursor) -> Result<Value, CliError> {
    let mut features = Vec::with_capacity(cursor.len());
    for parsed in cursor.iter() {
        match parsed {
            Ok(envelope) => features.push(feature(&envelope)?),
            Err(err) => log::warn!("Skipping unreadable stored feature: {err}"),
        }
    }
    Ok(json!({ "type": "FeatureCollection", "features": features }))
}

fn feature(envelope: &FeatureEnvelope) -> Result<Value, CliError> {
    let text = encode_geometry(&envelope.geometry).map_err(cosm_replica::ReplicaError::from)?;
    let geometry: Value = serde_json::from_str(&text).map_err(CliError::SerialiseOutput)?;
    let mut properties: Map<String, Value> = envelope
        .tags
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();
    properties.insert("kind".into(), json!(envelope.kind));
    if let Some(width) = envelope.width {
        properties.insert("width".into(), json!(width));
    }
    Ok(json!({
        "type": "Feature",
        "id": envelope.id,
        "geometry": geometry,
        "properties": properties,
    }))
}

pub(crate) fn nearest_line(line: &NearestLine) -> Value {
    json!({
        "line_id": line.line_id,
        "position": [line.nearest.point.x, line.nearest.point.y],
        "distance_m": line.nearest.distance_m,
        "index": line.nearest.index,
        "location_m": line.nearest.location_m,
    })
}

pub(crate) fn target_node(node: &TargetNode) -> Value {
    json!({
        "id": node.point.id,
        "position": [node.point.position.x, node.point.position.y],
        "tags": node.point.tags,
        "line_ids": node.line_ids,
    })
}
