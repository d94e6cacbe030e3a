/// Publication to the early-warning portal.
///
/// A run first builds a [`exposure::PublishPlan`] from its datasets and then
/// hands it to a [`Publisher`]: exposure payloads first, raster layers next,
/// and the "processed" notification last so the portal only recomputes once
/// everything is in.

pub mod audit;
pub mod client;
pub mod exposure;
pub mod raster;

use std::fs;
use std::path::PathBuf;

use crate::logging::{self, Stage};
use crate::model::PipelineError;
use exposure::{ExposurePayload, ProcessNotification, PublishPlan};
use raster::RasterLayer;

/// Destination of a publication.
pub trait Publisher {
    fn post_exposure(&mut self, payload: &ExposurePayload) -> Result<(), PipelineError>;
    fn post_raster(&mut self, layer: &RasterLayer) -> Result<(), PipelineError>;
    fn notify_processed(&mut self, notification: &ProcessNotification) -> Result<(), PipelineError>;
}

/// Sends a plan in order. Stops at the first failure; the notification is
/// not sent for a partial upload.
pub fn publish(publisher: &mut dyn Publisher, plan: &PublishPlan) -> Result<(), PipelineError> {
    let country = plan.notification.country_code_iso3.as_str();
    if plan.is_empty_exposure() {
        logging::info(Stage::Publish, Some(country), "no events; exposure is reset to zero");
    }
    for payload in &plan.exposures {
        publisher.post_exposure(payload)?;
    }
    logging::info(
        Stage::Publish,
        Some(country),
        &format!("{} exposure payloads sent", plan.exposures.len()),
    );

    for layer in &plan.rasters {
        publisher.post_raster(layer)?;
        logging::debug(Stage::Publish, Some(country), &format!("raster {} uploaded", layer.file_name));
    }

    publisher.notify_processed(&plan.notification)?;
    logging::info(
        Stage::Publish,
        Some(country),
        &format!("{} events processed for {}", plan.events.len(), plan.notification.date),
    );
    Ok(())
}

/// Publisher that keeps everything it is given, and optionally writes it to
/// a directory instead of calling the portal.
#[derive(Debug, Default)]
pub struct DryRunPublisher {
    out_dir: Option<PathBuf>,
    pub exposures: Vec<ExposurePayload>,
    pub rasters: Vec<RasterLayer>,
    pub notifications: Vec<ProcessNotification>,
}

impl DryRunPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also writes every payload as a file under `dir`.
    pub fn writing_to(dir: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(DryRunPublisher { out_dir: Some(dir), ..Self::default() })
    }

    fn write(&self, file_name: &str, contents: &str) -> Result<(), PipelineError> {
        if let Some(dir) = &self.out_dir {
            fs::write(dir.join(file_name), contents)?;
        }
        Ok(())
    }
}

impl Publisher for DryRunPublisher {
    fn post_exposure(&mut self, payload: &ExposurePayload) -> Result<(), PipelineError> {
        let file_name = format!(
            "exposure_{:04}_{}_{}_adm{}.json",
            self.exposures.len(),
            payload.dynamic_indicator,
            payload.lead_time,
            payload.admin_level
        );
        self.write(&file_name, &serde_json::to_string_pretty(payload)?)?;
        self.exposures.push(payload.clone());
        Ok(())
    }

    fn post_raster(&mut self, layer: &RasterLayer) -> Result<(), PipelineError> {
        self.write(&layer.file_name, &layer.to_ascii_grid())?;
        self.rasters.push(layer.clone());
        Ok(())
    }

    fn notify_processed(&mut self, notification: &ProcessNotification) -> Result<(), PipelineError> {
        self.write("process.json", &serde_json::to_string_pretty(notification)?)?;
        self.notifications.push(notification.clone());
        Ok(())
    }
}
