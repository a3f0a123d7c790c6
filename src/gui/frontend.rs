#![allow(clippy::collapsible_if)]
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use eframe::egui::{self, Color32, Pos2, Rect, Sense, Stroke, Vec2};
use log::{error, info, warn};

use crate::graph_utils::graph::{MindMapStore, NodeId, NodeUpdate, SuggestionKind};
use crate::graph_utils::node_types::{parse_css_color, NodeTypeUpdate, DEFAULT_TYPE_ID};
use crate::gui::canvas::{CanvasController, LinkState, StrokeOutcome, ViewTransform};
use crate::layout::force::{ForceRefiner, StepOutcome};
use crate::layout::placement::apply_level_layout;
use crate::layout::sizing::{node_size, TextMeasure, ARROW_SIZE, LABEL_FONT_SIZE};
use crate::layout::LevelOrdering;
use crate::markup::command_interface::execute_input;
use crate::persistence::persist::{self, AppStateFile};
use crate::persistence::settings::AppSettings;

// Quiet period after the last edit before the state file is rewritten
const AUTOSAVE_DEBOUNCE: Duration = Duration::from_millis(1000);
const MAX_SUGGESTIONS: usize = 8;

// Style for toast notifications
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum NoticeStyle {
    Subtle,
    Prominent,
}

/// Label measurement backed by the egui font system.
struct PainterMeasure<'a> {
    painter: &'a egui::Painter,
}

impl TextMeasure for PainterMeasure<'_> {
    fn measure(&self, text: &str) -> Vec2 {
        self.painter
            .layout_no_wrap(text.to_string(), egui::FontId::proportional(LABEL_FONT_SIZE), Color32::WHITE)
            .size()
    }
}

// Edit buffer for the node details window
#[derive(Clone, Debug, Default)]
struct NodeEditor {
    id: Option<NodeId>,
    text: String,
    node_type: String,
    tags: String,
    synonyms: String,
    details: String,
}

impl NodeEditor {
    fn load(&mut self, store: &MindMapStore, id: NodeId) {
        if let Some(n) = store.get_node(id) {
            *self = NodeEditor {
                id: Some(id),
                text: n.text.clone(),
                node_type: n.node_type.clone(),
                tags: n.tags.join(", "),
                synonyms: n.synonyms.join(", "),
                details: n.details.clone(),
            };
        }
    }

    fn to_update(&self) -> NodeUpdate {
        let split = |s: &str| -> Vec<String> {
            s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect()
        };
        NodeUpdate {
            text: Some(self.text.clone()),
            node_type: Some(self.node_type.clone()),
            tags: Some(split(&self.tags)),
            synonyms: Some(split(&self.synonyms)),
            details: Some(self.details.clone()),
            ..Default::default()
        }
    }
}

// Edit buffer for renaming / recoloring a node type
#[derive(Clone, Debug, Default)]
struct TypeEditor {
    id: String,
    name: String,
    color: String,
}

pub struct MindMapApp {
    store: MindMapStore,
    canvas: CanvasController,
    refiner: ForceRefiner,
    app_settings: AppSettings,
    // shape revision the level layout last ran for
    laid_out_shape: Option<u64>,
    // persistence
    seen_revision: u64,
    saved_revision: u64,
    last_change: Instant,
    save_error: Option<String>,
    last_info: Option<String>,
    last_info_time: Option<Instant>,
    last_info_style: NoticeStyle,
    // sidebar state
    command_input: String,
    default_type: String,
    search_query: String,
    new_type_prefix: String,
    import_path: String,
    show_settings: bool,
    editor: NodeEditor,
    type_editor: Option<TypeEditor>,
    last_canvas_rect: Option<Rect>,
    pointer_press_node: Option<NodeId>,
}

impl MindMapApp {
    pub fn new(store: MindMapStore) -> Self {
        let app_settings = AppSettings::load().unwrap_or_else(|e| {
            warn!("settings unreadable, using defaults: {e:#}");
            AppSettings::default()
        });
        let revision = store.revision();
        MindMapApp {
            canvas: CanvasController::new(app_settings.canvas_config()),
            refiner: ForceRefiner::new(app_settings.force_params()),
            store,
            app_settings,
            laid_out_shape: None,
            seen_revision: revision,
            saved_revision: revision,
            last_change: Instant::now(),
            save_error: None,
            last_info: None,
            last_info_time: None,
            last_info_style: NoticeStyle::Subtle,
            command_input: String::new(),
            default_type: DEFAULT_TYPE_ID.to_string(),
            search_query: String::new(),
            new_type_prefix: String::new(),
            import_path: String::new(),
            show_settings: false,
            editor: NodeEditor::default(),
            type_editor: None,
            last_canvas_rect: None,
            pointer_press_node: None,
        }
    }

    pub fn from_state(state: AppStateFile) -> Self {
        Self::new(state.into_store())
    }

    fn notify(&mut self, msg: impl Into<String>, style: NoticeStyle) {
        self.last_info = Some(msg.into());
        self.last_info_time = Some(Instant::now());
        self.last_info_style = style;
    }

    fn save_now(&mut self) {
        let state = AppStateFile::from_store(&self.store);
        match persist::save_active(&state) {
            Ok(path) => {
                self.saved_revision = self.store.revision();
                self.save_error = None;
                self.notify(format!("Saved to {}", path.display()), NoticeStyle::Subtle);
            }
            Err(e) => {
                error!("autosave failed: {e:#}");
                self.save_error = Some(format!("Save failed: {e:#}"));
            }
        }
    }

    fn autosave(&mut self) {
        let rev = self.store.revision();
        if rev != self.seen_revision {
            self.seen_revision = rev;
            self.last_change = Instant::now();
        }
        if rev != self.saved_revision && self.last_change.elapsed() >= AUTOSAVE_DEBOUNCE {
            self.save_now();
        }
    }

    fn submit_command(&mut self) {
        let input = std::mem::take(&mut self.command_input);
        let outcome = execute_input(&mut self.store, &input, &self.default_type);
        if outcome.mutated() {
            self.notify(
                format!(
                    "{} created, {} updated, {} links",
                    outcome.created.len(),
                    outcome.merged.len(),
                    outcome.links_added
                ),
                NoticeStyle::Subtle,
            );
        } else if outcome.skipped_segments > 0 {
            self.notify("Nothing to add", NoticeStyle::Subtle);
        }
        if !outcome.types_registered.is_empty() {
            info!("registered node types: {}", outcome.types_registered.join(", "));
        }
    }

    fn export_json(&mut self) {
        let dir = self.app_settings.export_dir();
        match persist::export_document_to_dir(&dir, &self.store.export_document()) {
            Ok(path) => self.notify(format!("Exported {}", path.display()), NoticeStyle::Prominent),
            Err(e) => self.save_error = Some(format!("Export failed: {e:#}")),
        }
    }

    fn export_csv(&mut self) {
        let path = self.app_settings.export_dir().join("mindmap-nodes.csv");
        match persist::export_nodes_csv(&self.store, &path) {
            Ok(()) => self.notify(format!("Exported {}", path.display()), NoticeStyle::Prominent),
            Err(e) => self.save_error = Some(format!("CSV export failed: {e:#}")),
        }
    }

    fn import_json(&mut self) {
        let path = PathBuf::from(self.import_path.trim());
        let doc = match persist::import_document_from_path(&path) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("import aborted: {e:#}");
                self.save_error = Some(format!("Import failed: {e:#}"));
                return;
            }
        };
        // keep the current graph recoverable before replacing it
        if let Err(e) = persist::save_versioned(&AppStateFile::from_store(&self.store)) {
            self.save_error = Some(format!("Backup before import failed: {e:#}"));
            return;
        }
        let report = self.store.import(doc);
        self.canvas.cancel_link();
        self.editor = NodeEditor::default();
        self.save_error = None;
        self.notify(
            format!(
                "Imported {} nodes ({} rejected), {} links ({} dropped)",
                report.nodes_added, report.nodes_rejected, report.links_added, report.links_dropped
            ),
            NoticeStyle::Prominent,
        );
    }

    fn apply_settings(&mut self) {
        self.canvas.config = self.app_settings.canvas_config();
        self.refiner.params = self.app_settings.force_params();
        if let Err(e) = self.app_settings.save() {
            self.save_error = Some(format!("Saving settings failed: {e:#}"));
        }
        // re-run layout for anything still unplaced and restart refinement
        self.laid_out_shape = None;
    }

    fn run_search(&mut self, now: f64) {
        let viewport = self.last_canvas_rect.map(|r| r.size()).unwrap_or(Vec2::new(800.0, 600.0));
        if self.canvas.search(&self.store, &self.search_query, viewport, now).is_none()
            && !self.search_query.trim().is_empty()
        {
            self.notify("No matching node", NoticeStyle::Subtle);
        }
    }

    // ---- layout ----

    fn update_layout(&mut self, available: Rect, dt: f32) -> bool {
        let shape = self.store.shape_revision();
        if self.laid_out_shape != Some(shape) {
            let placed = apply_level_layout(&mut self.store, &self.app_settings.layout_config(), available.width());
            if !placed.is_empty() {
                info!("placed {} new nodes", placed.len());
            }
            self.laid_out_shape = Some(shape);
            // only freshly placed nodes are refined; dragged and loaded ones stay put
            if self.app_settings.refinement_enabled && !placed.is_empty() {
                self.refiner.restart(shape, placed);
            } else {
                self.refiner.stop();
            }
        }
        if !self.refiner.is_running() {
            return false;
        }
        let positions = self.canvas.effective_positions(&self.store);
        let pinned: HashSet<NodeId> = self.canvas.dragging().into_iter().collect();
        let outcome = self.refiner.step_store(shape, &mut self.store, positions, &pinned, dt);
        matches!(outcome, StepOutcome::Moved { .. })
    }

    // ---- panels ----

    fn sidebar(&mut self, ctx: &egui::Context, now: f64) {
        egui::SidePanel::left("mind_map_sidebar")
            .resizable(true)
            .default_width(300.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    ui.heading("Add nodes");
                    ui.small("type:Text ~tags@a,b ~synonyms@x ~details@\"...\" -> Next");
                    let input = ui.add(
                        egui::TextEdit::multiline(&mut self.command_input)
                            .desired_rows(3)
                            .desired_width(f32::INFINITY)
                            .hint_text("idea:Launch -> task:Write brief"),
                    );
                    let submit_shortcut = input.has_focus()
                        && ui.input(|i| i.key_pressed(egui::Key::Enter) && i.modifiers.command);
                    ui.horizontal(|ui| {
                        egui::ComboBox::from_id_salt("default_type")
                            .selected_text(self.store.resolve_type(&self.default_type).name.clone())
                            .show_ui(ui, |ui| {
                                for t in self.store.node_types() {
                                    ui.selectable_value(&mut self.default_type, t.id.clone(), t.name.as_str());
                                }
                            });
                        if ui.button("Add").clicked() || submit_shortcut {
                            self.submit_command();
                        }
                    });

                    // Suggestions for the fragment after the last "->"
                    let fragment = self
                        .command_input
                        .rsplit("->")
                        .next()
                        .unwrap_or("")
                        .trim()
                        .to_string();
                    if !fragment.is_empty() {
                        let suggestions = self.store.suggestions(&fragment);
                        let mut chosen: Option<String> = None;
                        for s in suggestions.iter().take(MAX_SUGGESTIONS) {
                            let tag = match s.kind {
                                SuggestionKind::Node => "node",
                                SuggestionKind::History => "recent",
                                SuggestionKind::Markup => "chain",
                                SuggestionKind::Pattern => "pattern",
                            };
                            if ui.small_button(format!("{}  ({tag})", s.value)).clicked() {
                                chosen = Some(s.value.clone());
                            }
                        }
                        if let Some(value) = chosen {
                            let keep = self.command_input.len() - self.command_input.rsplit("->").next().unwrap_or("").len();
                            self.command_input.truncate(keep);
                            if keep > 0 {
                                self.command_input.push(' ');
                            }
                            self.command_input.push_str(&value);
                        }
                    }

                    ui.separator();
                    ui.heading("Search");
                    let search = ui.add(egui::TextEdit::singleline(&mut self.search_query).hint_text("text or synonym"));
                    if search.changed() {
                        self.run_search(now);
                    }

                    let mut select: Option<NodeId> = None;
                    let mut link_from: Option<NodeId> = None;
                    egui::ScrollArea::vertical().id_salt("node_list").max_height(220.0).show(ui, |ui| {
                        for n in self.store.search_nodes(&self.search_query) {
                            ui.horizontal(|ui| {
                                let color = type_color(&self.store, &n.node_type);
                                ui.colored_label(color, "■");
                                let selected = self.store.selected_id() == Some(n.id);
                                if ui.selectable_label(selected, n.text.as_str()).clicked() {
                                    select = Some(n.id);
                                }
                                if ui.small_button("link").on_hover_text("Start a link from this node").clicked() {
                                    link_from = Some(n.id);
                                }
                            });
                        }
                    });
                    if let Some(id) = select {
                        self.store.set_selected_node(Some(id));
                    }
                    if let Some(id) = link_from {
                        if let Some(p) = self.canvas.effective_position(&self.store, id) {
                            self.canvas.begin_link(&self.store, id, p);
                            self.notify("Click the target node to link", NoticeStyle::Subtle);
                        }
                    }

                    ui.separator();
                    ui.heading("Node types");
                    let mut remove_type: Option<String> = None;
                    let mut edit_type: Option<TypeEditor> = None;
                    for t in self.store.node_types() {
                        ui.horizontal(|ui| {
                            ui.colored_label(css_to_color32(&t.color), "■");
                            ui.label(t.name.as_str());
                            if ui.small_button("edit").clicked() {
                                edit_type = Some(TypeEditor { id: t.id.clone(), name: t.name.clone(), color: t.color.clone() });
                            }
                            if t.id != DEFAULT_TYPE_ID && ui.small_button("x").clicked() {
                                remove_type = Some(t.id.clone());
                            }
                        });
                    }
                    if let Some(id) = remove_type {
                        self.store.remove_node_type(&id);
                    }
                    if edit_type.is_some() {
                        self.type_editor = edit_type;
                    }
                    let mut close_editor = false;
                    if let Some(te) = &mut self.type_editor {
                        ui.horizontal(|ui| {
                            ui.add(egui::TextEdit::singleline(&mut te.name).desired_width(100.0).hint_text("name"));
                            ui.add(egui::TextEdit::singleline(&mut te.color).desired_width(90.0).hint_text("#rrggbb"));
                            if ui.small_button("Save").clicked() {
                                let update = NodeTypeUpdate {
                                    name: Some(te.name.trim().to_string()).filter(|n| !n.is_empty()),
                                    color: Some(te.color.trim().to_string()).filter(|c| parse_css_color(c).is_some()),
                                };
                                if !self.store.update_node_type(&te.id, update) {
                                    warn!("node type {} no longer exists", te.id);
                                }
                                close_editor = true;
                            }
                            if ui.small_button("Cancel").clicked() {
                                close_editor = true;
                            }
                        });
                    }
                    if close_editor {
                        self.type_editor = None;
                    }
                    ui.horizontal(|ui| {
                        ui.add(egui::TextEdit::singleline(&mut self.new_type_prefix).desired_width(140.0).hint_text("new type"));
                        if ui.button("Add type").clicked() && !self.new_type_prefix.trim().is_empty() {
                            let id = self.store.ensure_node_type(&self.new_type_prefix);
                            self.default_type = id;
                            self.new_type_prefix.clear();
                        }
                    });

                    ui.separator();
                    ui.heading("Data");
                    ui.horizontal(|ui| {
                        if ui.button("Export JSON").clicked() {
                            self.export_json();
                        }
                        if ui.button("Export CSV").clicked() {
                            self.export_csv();
                        }
                        if ui.button("Save version").clicked() {
                            match persist::save_versioned(&AppStateFile::from_store(&self.store)) {
                                Ok(p) => self.notify(format!("Saved version {}", p.display()), NoticeStyle::Prominent),
                                Err(e) => self.save_error = Some(format!("Save version failed: {e:#}")),
                            }
                        }
                    });
                    ui.horizontal(|ui| {
                        ui.add(egui::TextEdit::singleline(&mut self.import_path).desired_width(180.0).hint_text("path/to/export.json"));
                        if ui.button("Import").clicked() && !self.import_path.trim().is_empty() {
                            self.import_json();
                        }
                    });
                    ui.horizontal(|ui| {
                        if ui.button("Clean up links").clicked() {
                            let removed = self.store.cleanup_invalid_links();
                            self.notify(format!("Removed {removed} dangling links"), NoticeStyle::Subtle);
                        }
                        ui.toggle_value(&mut self.canvas.draw_mode, "Draw mode")
                            .on_hover_text("Draw a circle on the canvas to create a node");
                        ui.toggle_value(&mut self.show_settings, "Settings");
                    });

                    if let Some(err) = &self.save_error {
                        ui.colored_label(Color32::RED, err.as_str());
                    }
                    ui.small(format!("{} nodes, {} links", self.store.node_count(), self.store.link_count()));
                });
            });
    }

    fn settings_window(&mut self, ctx: &egui::Context) {
        if !self.show_settings {
            return;
        }
        let mut open = true;
        let mut changed = false;
        egui::Window::new("Settings").open(&mut open).resizable(false).show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("Level ordering");
                changed |= ui.radio_value(&mut self.app_settings.level_ordering, LevelOrdering::Insertion, "Insertion").changed();
                changed |= ui.radio_value(&mut self.app_settings.level_ordering, LevelOrdering::Degree, "Degree").changed();
            });
            changed |= ui.checkbox(&mut self.app_settings.refinement_enabled, "Force refinement").changed();
            changed |= ui.add(egui::Slider::new(&mut self.app_settings.link_strength, 0.0..=20.0).text("Link strength")).changed();
            changed |= ui.add(egui::Slider::new(&mut self.app_settings.repulsion_strength, 0.0..=50.0).text("Repulsion")).changed();
            changed |= ui.add(egui::Slider::new(&mut self.app_settings.search_focus_zoom, 0.5..=4.0).text("Search zoom")).changed();
            changed |= ui.add(egui::Slider::new(&mut self.app_settings.highlight_restore_ms, 250..=10_000).text("Highlight ms")).changed();
            ui.small(format!("Autosave: {}", self.app_settings.autosave_dir().display()));
            ui.small(format!("Exports: {}", self.app_settings.export_dir().display()));
        });
        if changed {
            self.apply_settings();
        }
        self.show_settings = open;
    }

    fn node_window(&mut self, ctx: &egui::Context) {
        let Some(id) = self.store.selected_id() else {
            self.editor = NodeEditor::default();
            return;
        };
        if self.editor.id != Some(id) {
            self.editor.load(&self.store, id);
        }
        let mut open = true;
        let mut update = false;
        let mut remove = false;
        egui::Window::new("Node").open(&mut open).default_width(280.0).show(ctx, |ui| {
            egui::Grid::new("node_fields").num_columns(2).show(ui, |ui| {
                ui.label("Text");
                ui.text_edit_singleline(&mut self.editor.text);
                ui.end_row();
                ui.label("Type");
                egui::ComboBox::from_id_salt("node_type")
                    .selected_text(self.store.resolve_type(&self.editor.node_type).name.clone())
                    .show_ui(ui, |ui| {
                        for t in self.store.node_types() {
                            ui.selectable_value(&mut self.editor.node_type, t.id.clone(), t.name.as_str());
                        }
                    });
                ui.end_row();
                ui.label("Tags");
                ui.text_edit_singleline(&mut self.editor.tags);
                ui.end_row();
                ui.label("Synonyms");
                ui.text_edit_singleline(&mut self.editor.synonyms);
                ui.end_row();
            });
            ui.label("Details");
            ui.add(egui::TextEdit::multiline(&mut self.editor.details).desired_rows(4));
            ui.horizontal(|ui| {
                update = ui.button("Update").clicked();
                remove = ui.button("Remove").clicked();
            });
        });
        if update {
            if self.store.update_node(id, self.editor.to_update()) {
                self.notify("Node updated", NoticeStyle::Subtle);
            } else {
                self.notify("Label or synonym already in use", NoticeStyle::Prominent);
                self.editor.load(&self.store, id);
            }
        }
        if remove {
            self.store.remove_node(id);
            self.editor = NodeEditor::default();
        } else if !open {
            self.store.set_selected_node(None);
        }
    }

    fn toast(&self, ctx: &egui::Context) {
        let (Some(msg), Some(when)) = (&self.last_info, self.last_info_time) else { return };
        if when.elapsed() > Duration::from_secs(3) {
            return;
        }
        egui::Area::new("bottom_right_toast".into())
            .anchor(egui::Align2::RIGHT_BOTTOM, egui::vec2(-12.0, -12.0))
            .interactable(false)
            .show(ctx, |ui| {
                let (fill, text_col) = match self.last_info_style {
                    NoticeStyle::Subtle => (Color32::from_rgba_premultiplied(20, 20, 20, 170), Color32::from_gray(200)),
                    NoticeStyle::Prominent => (Color32::from_rgba_premultiplied(30, 30, 30, 230), Color32::LIGHT_GREEN),
                };
                egui::Frame::popup(ui.style())
                    .corner_radius(egui::CornerRadius::same(8))
                    .fill(fill)
                    .inner_margin(egui::Margin::symmetric(10, 6))
                    .show(ui, |ui| {
                        ui.colored_label(text_col, msg.as_str());
                    });
            });
    }

    // ---- canvas ----

    fn canvas_panel(&mut self, ctx: &egui::Context, now: f64, dt: f32) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let available = ui.available_rect_before_wrap();
            self.last_canvas_rect = Some(available);
            let origin = available.min;
            let bg_resp = ui.allocate_rect(available, Sense::click_and_drag());
            let painter = ui.painter_at(available);
            let measure = PainterMeasure { painter: &painter };

            let mut animating = self.update_layout(available, dt);
            animating |= self.canvas.tick(now);

            let (pointer, press_origin, modifiers) =
                ui.input(|i| (i.pointer.hover_pos(), i.pointer.press_origin(), i.modifiers));
            let pointer_world = pointer.map(|p| self.canvas.view.to_world(origin, p));
            let hovered_node = pointer_world.and_then(|w| self.canvas.node_at(&self.store, w, &measure));
            self.canvas.set_hovered_node(hovered_node);

            if self.canvas.draw_mode {
                self.handle_stroke(ui, &bg_resp, origin);
            } else {
                self.handle_pointer(&bg_resp, origin, pointer_world, press_origin, hovered_node, modifiers.command, &measure);
            }

            // Zoom about the pointer
            if bg_resp.hovered() {
                let scroll = ui.input(|i| i.raw_scroll_delta.y);
                if scroll != 0.0 {
                    if let Some(p) = pointer {
                        self.canvas.interrupt_animation();
                        let factor = (1.0 + scroll * 0.001).clamp(0.9, 1.1);
                        self.canvas.view.zoom_about(origin, p, factor);
                    }
                }
            }

            if ui.input(|i| i.key_pressed(egui::Key::Escape)) {
                self.canvas.cancel_link();
            }
            if self.canvas.pending_delete().is_some()
                && !ctx.memory(|m| m.focused().is_some())
                && ui.input(|i| i.key_pressed(egui::Key::Delete) || i.key_pressed(egui::Key::Backspace))
            {
                self.canvas.delete_pending_link(&mut self.store);
            }

            self.paint(&painter, origin, &measure);
            if animating || self.canvas.dragging().is_some() || self.canvas.is_linking() {
                ctx.request_repaint();
            } else if let Some(deadline) = self.canvas.highlight_deadline() {
                ctx.request_repaint_after(Duration::from_secs_f64((deadline - now).max(0.0)));
            }
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_pointer(
        &mut self,
        bg_resp: &egui::Response,
        origin: Pos2,
        pointer_world: Option<Pos2>,
        press_origin: Option<Pos2>,
        hovered_node: Option<NodeId>,
        command: bool,
        measure: &dyn TextMeasure,
    ) {
        if let Some(w) = pointer_world {
            self.canvas.pointer_moved(w);
        }

        if bg_resp.drag_started() {
            let press_world = press_origin.map(|p| self.canvas.view.to_world(origin, p));
            self.pointer_press_node = press_world.and_then(|w| self.canvas.node_at(&self.store, w, measure));
            match (self.pointer_press_node, command) {
                (Some(id), true) => self.canvas.begin_link(&self.store, id, press_world.unwrap_or_default()),
                (Some(id), false) if !self.canvas.is_linking() => self.canvas.begin_drag(&self.store, id),
                _ => {}
            }
        }
        if bg_resp.dragged() {
            let delta = bg_resp.drag_delta();
            if self.canvas.dragging().is_some() {
                self.canvas.drag_by(delta / self.canvas.view.zoom);
            } else if !self.canvas.is_linking() && delta != Vec2::ZERO {
                self.canvas.interrupt_animation();
                self.canvas.view.pan += delta;
            }
        }
        if bg_resp.drag_stopped() {
            if self.canvas.is_linking() {
                self.canvas.pointer_released(&mut self.store, hovered_node);
            }
            if let Some(id) = self.canvas.end_drag(&mut self.store) {
                self.refiner.freeze(id);
            }
            self.pointer_press_node = None;
        }

        if bg_resp.clicked() {
            let on_control = pointer_world.is_some_and(|w| self.canvas.hits_delete_control(&self.store, w, measure));
            if on_control {
                self.canvas.delete_pending_link(&mut self.store);
            } else if let Some(id) = hovered_node {
                if command && !self.canvas.is_linking() {
                    self.canvas.begin_link(&self.store, id, pointer_world.unwrap_or_default());
                } else {
                    self.canvas.click_node(&mut self.store, id);
                }
            } else {
                self.canvas.cancel_link();
                self.store.set_selected_node(None);
            }
        }

        // Link hover only when not busy with a node
        if self.canvas.dragging().is_none() && !self.canvas.is_linking() {
            let on_control = pointer_world.is_some_and(|w| self.canvas.hits_delete_control(&self.store, w, measure));
            if !on_control {
                let link = match (hovered_node, pointer_world) {
                    (None, Some(w)) => self.canvas.link_at(&self.store, w, measure),
                    _ => None,
                };
                self.canvas.set_hovered_link(link);
            }
        }
    }

    fn handle_stroke(&mut self, ui: &egui::Ui, bg_resp: &egui::Response, origin: Pos2) {
        let pointer = ui.input(|i| i.pointer.interact_pos());
        if bg_resp.drag_started() {
            if let Some(p) = ui.input(|i| i.pointer.press_origin()) {
                self.canvas.begin_stroke(p);
            }
        }
        if bg_resp.dragged() {
            if let Some(p) = pointer {
                self.canvas.extend_stroke(p);
            }
        }
        if bg_resp.drag_stopped() {
            match self.canvas.finish_stroke(&mut self.store, origin) {
                StrokeOutcome::Created(_) => self.notify("Node created from drawing", NoticeStyle::Subtle),
                StrokeOutcome::Rejected => self.notify("A node with that label already exists", NoticeStyle::Subtle),
                StrokeOutcome::TooShort | StrokeOutcome::NotACircle { .. } => {}
            }
        }
    }

    fn paint(&self, painter: &egui::Painter, origin: Pos2, measure: &dyn TextMeasure) {
        let view: ViewTransform = self.canvas.view;
        let to_screen = |p: Pos2| view.to_screen(origin, p);
        painter.rect_filled(painter.clip_rect(), 0.0, Color32::from_rgb(24, 24, 28));

        // Links
        for link in self.store.links() {
            let key = (link.source, link.target);
            let Some((a, b)) = self.canvas.link_segment(&self.store, key, measure) else { continue };
            let (a, b) = (to_screen(a), to_screen(b));
            let emphasized = self.canvas.is_link_emphasized(key);
            let mut color = if self.canvas.pending_delete() == Some(key) {
                Color32::from_rgb(230, 90, 90)
            } else if emphasized {
                Color32::from_gray(220)
            } else {
                Color32::from_gray(150)
            };
            if self.canvas.is_link_dimmed(key) {
                color = color.gamma_multiply(0.25);
            }
            let width = if emphasized { 3.0 } else { 2.0 };
            painter.line_segment([a, b], Stroke::new(width, color));
            paint_arrowhead(painter, a, b, ARROW_SIZE * view.zoom, color);
        }

        if let Some((a, b)) = self.canvas.temp_line(&self.store) {
            painter.line_segment([to_screen(a), to_screen(b)], Stroke::new(2.0, Color32::from_rgb(80, 220, 120)));
        }

        // Nodes
        let positions: HashMap<NodeId, Pos2> = self.canvas.effective_positions(&self.store);
        let font = egui::FontId::proportional((LABEL_FONT_SIZE * view.zoom).clamp(6.0, 48.0));
        let tag_font = egui::FontId::proportional((LABEL_FONT_SIZE * 0.8 * view.zoom).clamp(5.0, 40.0));
        for node in self.store.nodes() {
            let Some(center) = positions.get(&node.id).copied() else { continue };
            let size = node_size(&node.text, measure);
            let rect = Rect::from_center_size(to_screen(center), Vec2::new(size.width, size.height) * view.zoom);
            let mut fill = type_color(&self.store, &node.node_type);
            let mut text_col = Color32::WHITE;
            if self.canvas.is_dimmed(node.id) {
                fill = fill.gamma_multiply(0.25);
                text_col = text_col.gamma_multiply(0.35);
            }
            let stroke = if self.store.selected_id() == Some(node.id) {
                Stroke::new(2.5, Color32::WHITE)
            } else if matches!(self.canvas.link_state(), LinkState::LinkingFrom { from, .. } if *from == node.id) {
                Stroke::new(2.5, Color32::from_rgb(80, 220, 120))
            } else if self.canvas.hovered_node() == Some(node.id) {
                Stroke::new(1.5, Color32::from_gray(230))
            } else {
                Stroke::new(1.0, Color32::from_gray(60))
            };
            painter.rect_filled(rect, 8.0 * view.zoom, fill);
            painter.rect_stroke(rect, 8.0 * view.zoom, stroke, egui::StrokeKind::Inside);
            painter.text(rect.center(), egui::Align2::CENTER_CENTER, &node.text, font.clone(), text_col);
            if let Some(caption) = node.tag_caption() {
                painter.text(
                    rect.center_bottom() + Vec2::new(0.0, 4.0 * view.zoom),
                    egui::Align2::CENTER_TOP,
                    caption,
                    tag_font.clone(),
                    text_col.gamma_multiply(0.7),
                );
            }
        }

        // Delete control at the midpoint of the pending link
        if let Some(c) = self.canvas.delete_control(&self.store, measure) {
            let c = to_screen(c);
            let r = self.canvas.config.delete_control_radius;
            painter.circle_filled(c, r, Color32::from_rgb(200, 60, 60));
            painter.text(c, egui::Align2::CENTER_CENTER, "×", egui::FontId::proportional(r * 1.6), Color32::WHITE);
        }

        let stroke_points = self.canvas.stroke_points();
        if stroke_points.len() > 1 {
            painter.add(egui::Shape::line(stroke_points.to_vec(), Stroke::new(2.0, Color32::from_gray(230))));
        }
    }
}

fn paint_arrowhead(painter: &egui::Painter, from: Pos2, tip_base: Pos2, size: f32, color: Color32) {
    let dir = tip_base - from;
    let len = dir.length();
    if len <= f32::EPSILON {
        return;
    }
    let d = dir / len;
    let n = Vec2::new(-d.y, d.x);
    let tip = tip_base + d * size;
    let points = vec![tip, tip_base + n * (size * 0.5), tip_base - n * (size * 0.5)];
    painter.add(egui::Shape::convex_polygon(points, color, Stroke::NONE));
}

fn css_to_color32(css: &str) -> Color32 {
    parse_css_color(css)
        .map(|(r, g, b)| Color32::from_rgb(r, g, b))
        .unwrap_or(Color32::from_gray(110))
}

fn type_color(store: &MindMapStore, type_id: &str) -> Color32 {
    css_to_color32(&store.resolve_type(type_id).color)
}

impl eframe::App for MindMapApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let (now, dt) = ctx.input(|i| (i.time, i.stable_dt.clamp(0.001, 0.033)));
        self.sidebar(ctx, now);
        self.settings_window(ctx);
        self.node_window(ctx);
        self.canvas_panel(ctx, now, dt);
        self.toast(ctx);
        self.autosave();
        if self.store.revision() != self.saved_revision {
            ctx.request_repaint_after(AUTOSAVE_DEBOUNCE);
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        if self.store.revision() != self.saved_revision {
            self.save_now();
        }
    }
}
