//! Screen grabbing through `xcap`.

use crate::{
    CaptureError, CoreResult,
    backend::ScreenSource,
    session::{CaptureRegion, CaptureTarget},
};

use std::panic::Location;

use error_location::ErrorLocation;
use image::{RgbaImage, imageops};
use tracing::{debug, info, instrument};
use xcap::Monitor;

pub struct XcapScreen {
    monitors: Vec<(CaptureRegion, Monitor)>,
}

impl XcapScreen {
    #[track_caller]
    #[instrument]
    pub fn new() -> CoreResult<Self> {
        let monitors = Monitor::all().map_err(|e| CaptureError::DeviceError {
            reason: format!("Failed to enumerate monitors: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let mut bounded = Vec::with_capacity(monitors.len());
        for monitor in monitors {
            bounded.push((monitor_bounds(&monitor)?, monitor));
        }

        if bounded.is_empty() {
            return Err(CaptureError::DeviceError {
                reason: "No monitors found".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        info!(monitor_count = bounded.len(), "Screen source initialized");

        Ok(Self { monitors: bounded })
    }

    /// Refresh rate of the primary monitor (or the first one).
    pub fn primary_refresh_rate() -> Option<f64> {
        let monitors = Monitor::all().ok()?;
        let primary = monitors
            .iter()
            .find(|m| m.is_primary().unwrap_or(false))
            .or_else(|| monitors.first())?;

        primary.frequency().ok().map(f64::from)
    }
}

impl ScreenSource for XcapScreen {
    #[track_caller]
    fn resolve(&mut self, target: &CaptureTarget) -> CoreResult<CaptureRegion> {
        let first = self.monitors[0].0;

        let region = match target {
            CaptureTarget::Region(region) => *region,
            CaptureTarget::Monitor(index) => self
                .monitors
                .get(*index)
                .map(|(bounds, _)| *bounds)
                .unwrap_or(first),
            CaptureTarget::AllScreens => self
                .monitors
                .iter()
                .fold(first, |acc, (bounds, _)| acc.union(bounds)),
        };

        debug!(?target, ?region, "Capture target resolved");

        Ok(region)
    }

    #[track_caller]
    fn capture(&mut self, region: &CaptureRegion) -> CoreResult<RgbaImage> {
        let mut canvas = RgbaImage::new(region.width, region.height);

        for (bounds, monitor) in &self.monitors {
            let Some(overlap) = bounds.intersect(region) else {
                continue;
            };

            let grab = monitor
                .capture_image()
                .map_err(|e| CaptureError::DeviceError {
                    reason: format!("Screen capture failed: {}", e),
                    location: ErrorLocation::from(Location::caller()),
                })?;

            let piece = imageops::crop_imm(
                &grab,
                (overlap.x - bounds.x) as u32,
                (overlap.y - bounds.y) as u32,
                overlap.width,
                overlap.height,
            )
            .to_image();

            imageops::replace(
                &mut canvas,
                &piece,
                i64::from(overlap.x - region.x),
                i64::from(overlap.y - region.y),
            );
        }

        Ok(canvas)
    }
}

#[track_caller]
fn monitor_bounds(monitor: &Monitor) -> CoreResult<CaptureRegion> {
    let read = |what: &str, e: xcap::XCapError| CaptureError::DeviceError {
        reason: format!("Failed to read monitor {}: {}", what, e),
        location: ErrorLocation::from(Location::caller()),
    };

    Ok(CaptureRegion::new(
        monitor.x().map_err(|e| read("x", e))?,
        monitor.y().map_err(|e| read("y", e))?,
        monitor.width().map_err(|e| read("width", e))?,
        monitor.height().map_err(|e| read("height", e))?,
    ))
}
