use tracing::{debug, info, warn};

use super::{CameraBackend, CameraDescriptor};

/// Snapshot of the available cameras plus the operator's choice.
#[derive(Debug, Default)]
pub struct CameraSelector {
    cameras: Vec<CameraDescriptor>,
    selected: Option<String>,
}

impl CameraSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh the list and select its first entry.
    ///
    /// The platform lists the built-in camera last, so the order is
    /// reversed to put it first. Never fails: errors leave an empty list.
    /// A refused access request is only logged; listing still runs.
    pub fn enumerate<B: CameraBackend>(&mut self, backend: &mut B) -> &[CameraDescriptor] {
        if let Err(e) = backend.request_access() {
            debug!("camera access request failed, listing anyway: {}", e);
        }

        self.cameras = match backend.list_devices() {
            Ok(mut devices) => {
                devices.reverse();
                devices
            }
            Err(e) => {
                warn!("Error enumerating cameras: {}", e);
                Vec::new()
            }
        };
        self.selected = self.cameras.first().map(|c| c.device_id.clone());

        info!(
            "Found {} camera(s): {:?}",
            self.cameras.len(),
            self.cameras.iter().map(|c| c.label.as_str()).collect::<Vec<_>>()
        );
        &self.cameras
    }

    pub fn cameras(&self) -> &[CameraDescriptor] {
        &self.cameras
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected_descriptor(&self) -> Option<&CameraDescriptor> {
        let id = self.selected.as_deref()?;
        self.cameras.iter().find(|c| c.device_id == id)
    }

    /// Select by id. Returns false for ids not in the current list.
    pub fn select(&mut self, device_id: &str) -> bool {
        if self.cameras.iter().any(|c| c.device_id == device_id) {
            self.selected = Some(device_id.to_string());
            true
        } else {
            false
        }
    }

    /// Advance to the next camera, wrapping around.
    pub fn select_next(&mut self) -> Option<&str> {
        if self.cameras.is_empty() {
            return None;
        }
        let next = match self.position() {
            Some(i) => (i + 1) % self.cameras.len(),
            None => 0,
        };
        self.selected = Some(self.cameras[next].device_id.clone());
        self.selected.as_deref()
    }

    fn position(&self) -> Option<usize> {
        let id = self.selected.as_deref()?;
        self.cameras.iter().position(|c| c.device_id == id)
    }

    /// Display label, falling back to `Camera <n>` for unnamed devices.
    pub fn label(&self, index: usize) -> Option<String> {
        self.cameras.get(index).map(|c| {
            if c.label.is_empty() {
                format!("Camera {}", index + 1)
            } else {
                c.label.clone()
            }
        })
    }
}
