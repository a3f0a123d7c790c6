use eframe::egui;
use log::{error, info};

use mind_loom::graph_utils::graph::MindMapStore;
use mind_loom::gui::frontend::MindMapApp;
use mind_loom::persistence::persist;
use mind_loom::persistence::settings::AppSettings;

fn main() -> eframe::Result {
    env_logger::init();

    let settings = AppSettings::load().unwrap_or_else(|e| {
        error!("could not read settings, using defaults: {e:#}");
        AppSettings::default()
    });
    persist::set_settings_override(settings);

    // A corrupt state file is moved aside by load_active; start empty in that case.
    let loaded_state = match persist::load_active() {
        Ok(state) => state,
        Err(e) => {
            error!("could not load saved mind map: {e:#}");
            None
        }
    };
    if let Some(state) = &loaded_state {
        info!("restored {} nodes and {} links", state.nodes.len(), state.links.len());
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1300.0, 760.0])
            // Provide sensible bounds so the UI stays usable on small screens
            .with_min_inner_size([700.0, 420.0])
            .with_resizable(true),
        ..Default::default()
    };
    eframe::run_native(
        "Mind-Loom",
        options,
        Box::new(move |_cc| {
            if let Some(state) = loaded_state {
                Ok(Box::new(MindMapApp::from_state(state)) as Box<dyn eframe::App>)
            } else {
                Ok(Box::new(MindMapApp::new(MindMapStore::new())) as Box<dyn eframe::App>)
            }
        }),
    )
}
