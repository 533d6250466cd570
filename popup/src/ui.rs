use eframe::egui;
use emotion_client::analysis::NoticeKind;
use emotion_client::LoopState;
use image::RgbImage;
use shared::{Rgb, StatusTone};

use crate::app::{EmotionApp, Tab};

const LABEL_FONT_SIZE: f32 = 16.0;

fn color(rgb: Rgb) -> egui::Color32 {
    egui::Color32::from_rgb(rgb.0, rgb.1, rgb.2)
}

fn color_image(image: &RgbImage) -> egui::ColorImage {
    egui::ColorImage::from_rgb(
        [image.width() as usize, image.height() as usize],
        image.as_raw(),
    )
}

/// Largest size that fits `max_width` without upscaling.
fn fit(width: u32, height: u32, max_width: f32) -> egui::Vec2 {
    let scale = (max_width / width.max(1) as f32).min(1.0);
    egui::vec2(width as f32 * scale, height as f32 * scale)
}

impl eframe::App for EmotionApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_messages();

        // Frames and responses arrive from the backend thread.
        ctx.request_repaint();

        if self.show_settings {
            show_settings_window(ctx, self);
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            let mut style = (*ctx.style()).clone();
            style.text_styles.insert(
                egui::TextStyle::Body,
                egui::FontId::new(16.0, egui::FontFamily::Proportional),
            );
            style.text_styles.insert(
                egui::TextStyle::Button,
                egui::FontId::new(16.0, egui::FontFamily::Proportional),
            );
            style.text_styles.insert(
                egui::TextStyle::Heading,
                egui::FontId::new(20.0, egui::FontFamily::Proportional),
            );
            ctx.set_style(style);

            ui.horizontal(|ui| {
                ui.heading("Emotion Lens");
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.small_button("⚙").clicked() {
                        self.draft = self.config.clone();
                        self.show_settings = true;
                    }
                    if let Some(error) = &self.connection_error {
                        ui.colored_label(color(StatusTone::Error.color()), "Offline")
                            .on_hover_text(error);
                    } else if !self.connected {
                        ui.colored_label(egui::Color32::YELLOW, "Connecting...");
                    }
                });
            });

            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.tab, Tab::Realtime, "Real-time");
                ui.selectable_value(&mut self.tab, Tab::Image, "Image");
            });
            ui.separator();

            match self.tab {
                Tab::Realtime => realtime_tab(ui, ctx, self),
                Tab::Image => image_tab(ui, ctx, self),
            }

            if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
                ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            }
        });
    }
}

fn realtime_tab(ui: &mut egui::Ui, ctx: &egui::Context, app: &mut EmotionApp) {
    ui.horizontal(|ui| {
        let (rect, _response) =
            ui.allocate_exact_size(egui::Vec2::splat(12.0), egui::Sense::hover());
        match app.capture_state {
            LoopState::Running => {
                let time = ctx.input(|i| i.time) as f32;
                let pulse = (time * 3.0).sin() * 0.3 + 0.7;
                let green = (255.0 * pulse) as u8;
                ui.painter()
                    .circle_filled(rect.center(), 6.0, egui::Color32::from_rgb(0, green, 0));
                ui.label("Analyzing");
            }
            LoopState::Starting | LoopState::Stopping => {
                ui.painter()
                    .circle_filled(rect.center(), 6.0, egui::Color32::YELLOW);
                ui.label("Waiting for camera...");
            }
            LoopState::Idle => {
                ui.painter()
                    .circle_filled(rect.center(), 6.0, egui::Color32::GRAY);
                ui.label("Idle");
            }
        }
    });

    ui.horizontal(|ui| {
        let busy = matches!(app.capture_state, LoopState::Starting | LoopState::Stopping);
        if ui
            .add_enabled(!busy, egui::Button::new("▶ Start").min_size(egui::vec2(100.0, 40.0)))
            .clicked()
        {
            app.start_capture();
        }
        if ui
            .add_enabled(!busy, egui::Button::new("⏹ Stop").min_size(egui::vec2(100.0, 40.0)))
            .clicked()
        {
            app.stop_capture();
        }
    });

    let status = app.view.status();
    if !status.text.is_empty() {
        ui.colored_label(color(status.tone.color()), &status.text);
    }
    ui.separator();

    // Re-upload the frame only when the view changed.
    let revision = app.view.revision();
    if app.view_revision != Some(revision) {
        app.view_revision = Some(revision);
        app.frame_texture = app.view.read(|view| {
            view.canvas.frame.as_ref().map(|frame| {
                ctx.load_texture("live-frame", color_image(frame), egui::TextureOptions::LINEAR)
            })
        });
    }

    let (preview_visible, boxes) = app
        .view
        .read(|view| (view.preview_visible, view.canvas.boxes.clone()));
    if !preview_visible && boxes.is_empty() {
        return;
    }
    let Some(texture) = &app.frame_texture else {
        return;
    };

    let [width, height] = texture.size();
    let size = fit(width as u32, height as u32, ui.available_width());
    let (rect, _response) = ui.allocate_exact_size(size, egui::Sense::hover());
    let painter = ui.painter_at(rect);
    painter.image(
        texture.id(),
        rect,
        egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
        egui::Color32::WHITE,
    );

    let scale = size.x / width.max(1) as f32;
    for face in &boxes {
        let stroke_color = color(face.color);
        let min = rect.min + egui::vec2(face.region.x, face.region.y) * scale;
        let max = min + egui::vec2(face.region.w, face.region.h) * scale;
        painter.rect_stroke(
            egui::Rect::from_min_max(min, max),
            0.0,
            egui::Stroke::new(emotion_client::view::BOX_LINE_WIDTH as f32, stroke_color),
        );

        let (x, y) = face.label_anchor();
        painter.text(
            rect.min + egui::vec2(x, y) * scale,
            egui::Align2::LEFT_BOTTOM,
            &face.label,
            egui::FontId::proportional(LABEL_FONT_SIZE),
            stroke_color,
        );
    }
}

fn image_tab(ui: &mut egui::Ui, ctx: &egui::Context, app: &mut EmotionApp) {
    if let Some(image) = app.pending_result_image.take() {
        app.result_texture = Some(ctx.load_texture(
            "result-image",
            color_image(&image),
            egui::TextureOptions::LINEAR,
        ));
    }

    ui.horizontal(|ui| {
        ui.label("Image file:");
        ui.add(
            egui::TextEdit::singleline(&mut app.image_path)
                .hint_text("/path/to/photo.jpg")
                .desired_width(ui.available_width() - 120.0),
        );
        if ui
            .add_enabled(!app.analysis.busy, egui::Button::new("Analyze"))
            .clicked()
        {
            app.analyze();
        }
    });

    if app.analysis.busy {
        ui.horizontal(|ui| {
            ui.spinner();
            ui.label(&app.analysis.message);
        });
    } else if !app.analysis.message.is_empty() {
        ui.label(&app.analysis.message);
    }

    egui::ScrollArea::vertical().show(ui, |ui| {
        for face in &app.analysis.faces {
            ui.group(|ui| {
                ui.strong(face.title());
                ui.label(&face.headline);
                for emotion in &face.emotions {
                    ui.label(emotion);
                }
            });
        }

        if let Some(texture) = &app.result_texture {
            let [width, height] = texture.size();
            let size = fit(width as u32, height as u32, ui.available_width());
            ui.image((texture.id(), size));
        }

        if app.analysis.can_save && ui.button("Save result").clicked() {
            app.save_result();
        }

        for notice in &app.analysis.notices {
            let tone = match notice.kind {
                NoticeKind::Success => StatusTone::Success,
                NoticeKind::Failure => StatusTone::Error,
            };
            ui.colored_label(color(tone.color()), &notice.text);
        }
    });
}

fn show_settings_window(ctx: &egui::Context, app: &mut EmotionApp) {
    egui::Window::new("Settings")
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
        .show(ctx, |ui| {
            ui.set_min_width(320.0);

            egui::Grid::new("settings-grid")
                .num_columns(2)
                .spacing([12.0, 6.0])
                .show(ui, |ui| {
                    ui.label("Server");
                    ui.text_edit_singleline(&mut app.draft.server.base_url);
                    ui.end_row();

                    ui.label("Username");
                    let username = app.draft.server.username.get_or_insert_with(String::new);
                    ui.text_edit_singleline(username);
                    ui.end_row();

                    ui.label("Password");
                    let password = app.draft.server.password.get_or_insert_with(String::new);
                    ui.add(egui::TextEdit::singleline(password).password(true));
                    ui.end_row();

                    ui.label("Camera");
                    ui.text_edit_singleline(&mut app.draft.capture.device);
                    ui.end_row();

                    ui.label("Interval (ms)");
                    ui.add(
                        egui::DragValue::new(&mut app.draft.capture.interval_ms)
                            .range(100..=60_000)
                            .speed(50),
                    );
                    ui.end_row();
                });

            ui.separator();

            ui.horizontal(|ui| {
                if ui.button("Save").clicked() {
                    for field in [&mut app.draft.server.username, &mut app.draft.server.password] {
                        if field.as_deref().is_some_and(str::is_empty) {
                            *field = None;
                        }
                    }
                    app.apply_settings();
                }

                if ui.button("Cancel").clicked() {
                    app.show_settings = false;
                }
            });
        });
}
