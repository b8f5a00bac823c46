//! Data-driven example: kinds and part templates from RON files.
//!
//! Loads `crates/flowgrid-examples/data/`, places a hydrogen line and a
//! steam line sharing one storage tank, and saves and reloads the system
//! halfway through.
//!
//! Run with: `cargo run -p flowgrid-examples --example data_driven`

use flowgrid_core::fixed::Fixed64;
use flowgrid_core::id::NodeId;
use flowgrid_core::spatial::GridPosition;
use flowgrid_core::system::{DestroyMode, FlowSystem};
use flowgrid_data::{FlowData, load_flow_data};
use flowgrid_spatial::{Placement, Rotation, SpatialIndex};
use std::path::Path;

fn place(
    data: &FlowData,
    system: &mut FlowSystem,
    index: &mut SpatialIndex,
    name: &str,
    x: i32,
    y: i32,
) -> NodeId {
    let template = data.part(name).unwrap();
    let node = system.spawn_part(&template.spec);
    index
        .place(
            node,
            Placement {
                origin: GridPosition::new(x, y),
                footprint: template.footprint,
                rotation: Rotation::None,
                layer: template.spec.family,
            },
        )
        .unwrap();
    node
}

fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("data");
    let data = match load_flow_data(&dir) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("failed to load {}: {e}", dir.display());
            std::process::exit(1);
        }
    };
    println!("Loaded {} kinds and {} part templates", data.registry.len(), data.parts.len());
    let steam = data.registry.kind_id("steam").unwrap();
    let hydrogen = data.registry.kind_id("hydrogen").unwrap();

    let mut system = data.build_system();
    let mut index = SpatialIndex::new();

    // electrolyzer - pipe - [tank 2x2] - pipe - turbine_inlet
    let electrolyzer = place(&data, &mut system, &mut index, "electrolyzer", 0, 0);
    place(&data, &mut system, &mut index, "pipe", 1, 0);
    let tank = place(&data, &mut system, &mut index, "gas_tank", 2, 0);
    place(&data, &mut system, &mut index, "pipe", 4, 1);
    let inlet = place(&data, &mut system, &mut index, "turbine_inlet", 5, 1);

    system.try_add(electrolyzer, hydrogen, Fixed64::from_num(20));
    system.try_add(tank, steam, Fixed64::from_num(40));

    let report = |system: &FlowSystem| {
        let stored = |node, kind| {
            system
                .container(node)
                .map(|c| c.stored_of(kind).to_num::<f64>())
                .unwrap_or(0.0)
        };
        println!(
            "Tick {:>2}: electrolyzer H2={:>4.1} tank H2={:>4.1} steam={:>4.1} inlet steam={:>4.1}",
            system.tick_count(),
            stored(electrolyzer, hydrogen),
            stored(tank, hydrogen),
            stored(tank, steam),
            stored(inlet, steam),
        );
    };

    for _ in 0..5 {
        system.tick(&index);
        report(&system);
    }

    let bytes = system.save().unwrap();
    println!("\nSaved {} bytes; reloading\n", bytes.len());
    let mut system = FlowSystem::load(&bytes, data.registry.clone()).unwrap();

    for _ in 0..10 {
        system.tick(&index);
        report(&system);
    }

    index.remove(tank).unwrap();
    if let Some(destroyed) = system.on_destroyed(tank, DestroyMode::Kill) {
        println!("\nTank destroyed:");
        for value in destroyed.released {
            let name = data
                .registry
                .get(value.kind)
                .map(|k| k.name.as_str())
                .unwrap_or("?");
            println!("  {:.1} {name} -> {:?}", value.amount.to_num::<f64>(), value.effect);
        }
    }
}
