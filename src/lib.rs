/// Hazard trigger service.
///
/// Compares seasonal rainfall and river-discharge ensembles against their
/// hindcast climatology, decides per climate region or admin area and lead
/// time whether a drought or flood trigger is met, and publishes the result
/// to the early-warning portal.
///
/// Modules, leaves first:
/// - `model`: shared types and the error taxonomy.
/// - `config`, `secrets`, `logging`: ambient setup of a run.
/// - `store`, `datasets`: the keyed dataset store and a run's datasets.
/// - `analysis`: climatology comparison and spatial aggregation.
/// - `alert`: trigger classification and season windowing.
/// - `ingest`, `reference`: grid, boundary and climate-region sources.
/// - `publish`: payloads, the portal client and audit exports.
/// - `pipeline`: drought and flood runs end to end.

pub mod alert;
pub mod analysis;
pub mod config;
pub mod datasets;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod publish;
pub mod reference;
pub mod secrets;
pub mod store;
