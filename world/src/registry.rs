//! Location coordinate registry.

use std::collections::BTreeMap;

use route_replay_core::{Coordinate, LocationId, RegistryView};

/// Registry that maps location names to planar coordinates.
///
/// Knowledge is partial: events may reference locations that never receive a
/// coordinate. Placing a location twice keeps the latest coordinate.
#[derive(Clone, Debug, Default)]
pub(crate) struct LocationRegistry {
    entries: BTreeMap<LocationId, Coordinate>,
}

impl LocationRegistry {
    pub(crate) fn place(&mut self, location: LocationId, coordinate: Coordinate) {
        let _ = self.entries.insert(location, coordinate);
    }

    pub(crate) fn view(&self) -> RegistryView<'_> {
        RegistryView::new(&self.entries)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_placement_overrides_earlier_one() {
        let mut registry = LocationRegistry::default();
        registry.place(LocationId::new("home"), Coordinate::new(1.0, 2.0));
        registry.place(LocationId::new("home"), Coordinate::new(3.0, 4.0));

        let view = registry.view();
        assert_eq!(view.len(), 1);
        assert_eq!(
            view.coordinate(&LocationId::new("home")),
            Some(Coordinate::new(3.0, 4.0))
        );
        assert_eq!(view.coordinate(&LocationId::new("office")), None);
    }
}
