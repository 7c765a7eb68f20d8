//! Flex Panel Demo
//!
//! A column panel with a title and a row of buttons, laid out on the flex
//! worker. Prints each node's computed box and its 3D offset once layout
//! settles.
//!
//! Run with: cargo run -p troika_flex --example flex_panel

use troika_core::{Descriptor, FacadeId, FacadeTree, Key, RecordingRenderer, TroikaConfig, World};
use troika_flex::{FlexLayoutSystem, FlexNodeFacade, FLEX_BOX};

fn panel() -> Descriptor {
    let buttons: Vec<Descriptor> = ["ok", "cancel", "help"]
        .into_iter()
        .map(|label| {
            Descriptor::new(FLEX_BOX)
                .key(label)
                .prop("text", label)
                .prop("fontSize", 12.0)
                .prop("padding", 4.0)
        })
        .collect();

    Descriptor::new(FLEX_BOX)
        .key("panel")
        .prop("width", 240.0)
        .prop("height", 120.0)
        .prop("flexDirection", "column")
        .prop("padding", 8.0)
        .prop("gap", 8.0)
        .child(
            Descriptor::new(FLEX_BOX)
                .key("title")
                .prop("text", "Settings")
                .prop("fontSize", 16.0),
        )
        .child(
            Descriptor::new(FLEX_BOX)
                .key("buttons")
                .prop("flexDirection", "row")
                .prop("justifyContent", "space-between")
                .children(buttons),
        )
}

fn print_subtree(tree: &FacadeTree, id: FacadeId, depth: usize) {
    if let Some(node) = tree.get::<FlexNodeFacade>(id) {
        if let Some(computed) = node.computed() {
            println!(
                "{:indent$}{:?}: {}x{} at ({}, {}), offset ({:.1}, {:.1})",
                "",
                tree.key(id),
                computed.width,
                computed.height,
                computed.left,
                computed.top,
                node.object.position.x,
                node.object.position.y,
                indent = depth * 2,
            );
        }
    }
    for child in tree.children(id) {
        print_subtree(tree, child, depth + 1);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = TroikaConfig::default();
    let mut world = World::new(&config, RecordingRenderer::new());
    world.add_system(FlexLayoutSystem::new());
    world.set_scene(panel());

    let mut now = 0.0;
    loop {
        let outcome = world.tick(now)?;
        if !outcome.needs_another_frame {
            break;
        }
        now += 16.0;
        std::thread::sleep(std::time::Duration::from_millis(1));
    }

    let panel = world.tree().child(world.root(), &Key::from("panel"));
    if let Some(panel) = panel {
        print_subtree(world.tree(), panel, 0);
    }
    world.shutdown();
    Ok(())
}
