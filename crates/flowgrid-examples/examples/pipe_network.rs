//! Pipe network example: producer, storage, consumer and requester.
//!
//! Lays out a small gas plant on a grid, runs it for a while, then
//! demolishes a pipe to show the network splitting and reforming.
//!
//! Run with: `cargo run -p flowgrid-examples --example pipe_network`
//! Set `RUST_LOG=flowgrid_core=debug` to watch networks form.

use flowgrid_core::container::ContainerConfig;
use flowgrid_core::event::FlowEvent;
use flowgrid_core::fixed::Fixed64;
use flowgrid_core::id::NodeId;
use flowgrid_core::kind::{Color, FlowValueKind, KindRegistryBuilder};
use flowgrid_core::network::ConsumerHook;
use flowgrid_core::part::{NetworkPart, PartSpec, RequesterSettings};
use flowgrid_core::role::RoleSet;
use flowgrid_core::spatial::GridPosition;
use flowgrid_core::system::{DestroyMode, FlowSystem, SystemConfig};
use flowgrid_spatial::SpatialIndex;
use tracing_subscriber::EnvFilter;

/// Burns half a unit of whatever it holds each tick.
struct Burner;

impl ConsumerHook for Burner {
    fn consume(&mut self, _node: NodeId, part: &mut NetworkPart, _tick: u64) {
        if let Some(container) = part.container_mut() {
            let _ = container.try_consume(Fixed64::from_num(0.5));
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let mut kinds = KindRegistryBuilder::new();
    let steam = kinds.register(FlowValueKind::new("steam").with_color(Color::rgb(0.9, 0.9, 0.95)));
    let registry = kinds.build().unwrap();

    let mut system = FlowSystem::new(registry, SystemConfig::default())
        .with_consumer_hook(Box::new(Burner));
    let mut index = SpatialIndex::with_bounds(16, 4);

    let container = |capacity: i32| ContainerConfig::new(Fixed64::from_num(capacity), vec![steam]);
    let boiler = PartSpec::new("boiler", RoleSet::PRODUCER).with_container(container(100));
    let tank = PartSpec::new("tank", RoleSet::STORAGE).with_container(container(40));
    let pipe = PartSpec::new("pipe", RoleSet::TRANSMITTER);
    let burner = PartSpec::new("burner", RoleSet::CONSUMER).with_container(container(4));
    let inlet = PartSpec::new("inlet", RoleSet::REQUESTER)
        .with_container(container(20))
        .with_requester(RequesterSettings::automatic(Fixed64::from_num(0.5), &[steam]));

    let mut build = |system: &mut FlowSystem, spec: &PartSpec, x: i32| {
        let node = system.spawn_part(spec);
        index
            .place_single(node, GridPosition::new(x, 0), spec.family)
            .unwrap();
        node
    };

    // boiler - pipe - tank - pipe - pipe - burner
    //                   \_ pipe - inlet (below the tank)
    let boiler_id = build(&mut system, &boiler, 0);
    build(&mut system, &pipe, 1);
    let tank_id = build(&mut system, &tank, 2);
    let cut = build(&mut system, &pipe, 3);
    build(&mut system, &pipe, 4);
    let burner_id = build(&mut system, &burner, 5);
    let below = system.spawn_part(&pipe);
    index
        .place_single(below, GridPosition::new(2, 1), pipe.family)
        .unwrap();
    let inlet_id = system.spawn_part(&inlet);
    index
        .place_single(inlet_id, GridPosition::new(2, 2), inlet.family)
        .unwrap();

    system.try_add(boiler_id, steam, Fixed64::from_num(60));

    println!("=== Running the plant ===\n");
    for _ in 0..12 {
        let events = system.tick(&index);
        let level = |node| system.container(node).map(|c| c.stored_of(steam)).unwrap_or_default();
        println!(
            "Tick {:>2}: boiler={:>5.1} tank={:>5.1} burner={:>4.1} inlet={:>5.1}",
            system.tick_count(),
            level(boiler_id).to_num::<f64>(),
            level(tank_id).to_num::<f64>(),
            level(burner_id).to_num::<f64>(),
            level(inlet_id).to_num::<f64>(),
        );
        for event in &events {
            println!("  {event:?}");
        }
    }

    println!("\n=== Demolishing the pipe east of the tank ===\n");
    index.remove(cut).unwrap();
    system.on_destroyed(cut, DestroyMode::Deconstruct);
    for event in system.tick(&index) {
        match event {
            FlowEvent::NetworkFormed { network, members, .. } => {
                println!("  formed {network:?} with {members} members");
            }
            FlowEvent::NetworkDissolved { network, .. } => println!("  dissolved {network:?}"),
            other => println!("  {other:?}"),
        }
    }
    println!(
        "\nTank and burner share a network: {}",
        system.network_of(tank_id).is_some()
            && system.network_of(tank_id) == system.network_of(burner_id)
    );
}
