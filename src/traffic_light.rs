use crate::world::{ActorId, TrafficLight};

/// Remembers the light the vehicle has already committed to passing.
///
/// A vehicle that enters a junction on yellow is still under the influence
/// of that light after it turns red. The light is ignored until the nearest
/// light is a different one, or no light at all.
#[derive(Debug, Clone, Default)]
pub struct TrafficLightMemory {
    ignored: Option<ActorId>,
}

impl TrafficLightMemory {
    /// Returns whether the vehicle must stop for `light`.
    pub fn must_stop(
        &mut self,
        light: Option<&TrafficLight>,
        in_junction: bool,
        brake_distance: f64,
    ) -> bool {
        let mut stop = false;

        if let Some(light) = light.filter(|light| light.state.requires_stop()) {
            if in_junction {
                self.ignored = Some(light.id);
            } else if self.ignored != Some(light.id) {
                stop = light.distance <= brake_distance;
            }
        }

        if self.ignored != light.map(|light| light.id) {
            self.ignored = None;
        }

        stop
    }

    pub fn ignored(&self) -> Option<ActorId> {
        self.ignored
    }
}
