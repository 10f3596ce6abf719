use route_replay_core::{AgentId, Coordinate, Hour, LocationId};
use route_replay_world::{self as world, query, ObservationRecord};

fn record(offset: f64, agent: u32, location: &str) -> ObservationRecord {
    ObservationRecord::new(Hour::new(offset), AgentId::new(agent), LocationId::new(location))
}

fn sample_world() -> world::World {
    world::load(
        vec![
            record(0.0, 7, "home"),
            record(1.0, 7, "home"),
            record(2.0, 7, "home"),
            record(8.0, 7, "office"),
            record(9.0, 7, "office"),
            record(18.0, 7, "home"),
            record(0.0, 2, "gym"),
            record(30.0, 2, "gym"),
            record(0.0, 11, "nowhere"),
        ],
        vec![
            (LocationId::new("home"), Coordinate::new(55.70, 37.60)),
            (LocationId::new("office"), Coordinate::new(55.76, 37.62)),
            (LocationId::new("gym"), Coordinate::new(55.80, 37.50)),
        ],
    )
}

#[test]
fn load_collapses_repeated_locations() {
    let world = sample_world();
    let track = query::track(&world, AgentId::new(7)).expect("agent 7 is known");
    let offsets: Vec<f64> = track.events().iter().map(|event| event.offset.get()).collect();

    assert_eq!(offsets, vec![0.0, 8.0, 18.0]);
}

#[test]
fn load_refreshes_locations_after_long_gaps() {
    let world = sample_world();
    let track = query::track(&world, AgentId::new(2)).expect("agent 2 is known");

    assert_eq!(track.events().len(), 2, "a 30 hour gap records the repeat");
}

#[test]
fn agents_are_enumerated_in_ascending_order() {
    let world = sample_world();

    assert_eq!(
        query::agent_ids(&world),
        vec![AgentId::new(2), AgentId::new(7), AgentId::new(11)]
    );
    let selection: Vec<_> = query::default_selection(&world, 2).into_iter().collect();
    assert_eq!(selection, vec![AgentId::new(2), AgentId::new(7)]);
}

#[test]
fn time_span_is_latest_offset() {
    let world = sample_world();
    assert_eq!(query::time_span(&world), Hour::new(30.0));
    assert_eq!(query::time_span(&world::World::new()), Hour::new(0.0));
}

#[test]
fn trajectory_skips_unknown_locations() {
    let world = sample_world();

    assert_eq!(
        query::trajectory(&world, AgentId::new(7)),
        vec![
            Coordinate::new(55.70, 37.60),
            Coordinate::new(55.76, 37.62),
            Coordinate::new(55.70, 37.60),
        ]
    );
    assert!(query::trajectory(&world, AgentId::new(11)).is_empty());
    assert!(query::trajectory(&world, AgentId::new(99)).is_empty());
}

#[test]
fn unknown_agents_have_no_track() {
    let world = sample_world();
    assert!(query::track(&world, AgentId::new(404)).is_none());
    assert_eq!(
        query::coordinate(&world, &LocationId::new("nowhere")),
        None
    );
}
