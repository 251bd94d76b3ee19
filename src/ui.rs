use crate::{
    app::AppContext,
    diffusion::GeneratedImage,
    ollama::ModelInfo,
    state::{Connectivity, RequestSeq},
};
use adw::gtk::{
    self, gdk, prelude::*, Align, Box as GtkBox, Button, ComboBoxText, CssProvider, Entry,
    FileChooserAction, FileChooserNative, Label, Orientation, ResponseType, ScrolledWindow,
    Separator, TextView,
};
use adw::{Application, ApplicationWindow, HeaderBar, Toast, ToastOverlay};
use anyhow::Result;
use gdk_pixbuf::PixbufLoader;
use log::warn;
use std::{fs, rc::Rc};

const APP_CSS: &str = include_str!("../assets/style.css");

const ENHANCE_FAILED_MESSAGE: &str =
    "Failed to enhance prompt. Ensure Ollama is running and the model is downloaded.";
const NO_MODELS_LABEL: &str = "No models found…";

fn generate_failed_message(sd_url: &str) -> String {
    format!(
        "Failed to generate image. Please check your Image Generator API URL ({sd_url}) \
         and ensure it accepts expected requests (e.g., AUTOMATIC1111 runs with --api)."
    )
}

pub fn bootstrap(app: &Application, context: AppContext) -> Result<()> {
    if let Err(err) = adw::init() {
        adw::glib::g_warning!(crate::app::APP_ID, "failed to initialize Adwaita: {err}");
    }

    install_application_css();

    let overlay = build_shell(&context);

    let window = ApplicationWindow::builder()
        .application(app)
        .title("LuminaGen")
        .default_width(1080)
        .default_height(760)
        .content(&overlay)
        .build();

    window.present();
    Ok(())
}

fn install_application_css() {
    if let Some(display) = gdk::Display::default() {
        let provider = CssProvider::new();
        provider.load_from_data(APP_CSS);
        gtk::style_context_add_provider_for_display(
            &display,
            &provider,
            gtk::STYLE_PROVIDER_PRIORITY_APPLICATION,
        );
    }
}

fn build_header() -> HeaderBar {
    let title_label = Label::builder().label("LuminaGen").xalign(0.5).build();

    let subtitle_label = Label::builder()
        .label("Local prompt enhancement and image generation")
        .xalign(0.5)
        .build();
    subtitle_label.add_css_class("dim-label");

    let title_column = GtkBox::builder()
        .orientation(Orientation::Vertical)
        .spacing(2)
        .halign(Align::Center)
        .build();
    title_column.append(&title_label);
    title_column.append(&subtitle_label);

    HeaderBar::builder().title_widget(&title_column).build()
}

fn build_shell(context: &AppContext) -> ToastOverlay {
    let overlay = ToastOverlay::new();

    let root = GtkBox::builder()
        .orientation(Orientation::Vertical)
        .spacing(12)
        .margin_top(12)
        .margin_bottom(12)
        .margin_start(12)
        .margin_end(12)
        .build();

    root.append(&build_header());
    root.append(&Separator::new(Orientation::Horizontal));

    let columns = GtkBox::builder()
        .orientation(Orientation::Horizontal)
        .spacing(16)
        .hexpand(true)
        .vexpand(true)
        .build();

    // Settings sidebar -------------------------------------------------------

    let settings_column = GtkBox::builder()
        .orientation(Orientation::Vertical)
        .spacing(16)
        .width_request(300)
        .build();
    settings_column.add_css_class("settings-panel");

    let settings_heading = Label::builder().label("Settings").halign(Align::Start).build();
    settings_heading.add_css_class("heading");

    let status_badge = Label::builder().label("Ollama Offline").build();
    status_badge.add_css_class("status-badge");
    status_badge.add_css_class("offline");

    let settings_header_row = GtkBox::builder()
        .orientation(Orientation::Horizontal)
        .spacing(8)
        .build();
    settings_header_row.append(&settings_heading);
    let header_spacer = GtkBox::builder().hexpand(true).build();
    settings_header_row.append(&header_spacer);
    settings_header_row.append(&status_badge);
    settings_column.append(&settings_header_row);

    let initial_settings = context.settings.snapshot();

    let ollama_entry = Entry::builder()
        .placeholder_text("http://localhost:11434")
        .hexpand(true)
        .build();
    ollama_entry.set_text(&initial_settings.ollama_url);
    settings_column.append(&labelled_row("Ollama API URL", &ollama_entry));

    let model_dropdown = ComboBoxText::new();
    rebuild_model_dropdown(&model_dropdown, &[], None);
    settings_column.append(&labelled_row("LLM Model (Prompt Engineer)", &model_dropdown));

    settings_column.append(&Separator::new(Orientation::Horizontal));

    let sd_entry = Entry::builder()
        .placeholder_text("http://127.0.0.1:7860")
        .hexpand(true)
        .build();
    sd_entry.set_text(&initial_settings.sd_url);
    let sd_row = labelled_row("Image Generator API URL", &sd_entry);
    let sd_hint = Label::builder()
        .label("Point to the AUTOMATIC1111 built-in API (requires --api).")
        .wrap(true)
        .halign(Align::Start)
        .build();
    sd_hint.add_css_class("dim-label");
    sd_row.append(&sd_hint);
    settings_column.append(&sd_row);

    // Main column ------------------------------------------------------------

    let main_column = GtkBox::builder()
        .orientation(Orientation::Vertical)
        .spacing(16)
        .hexpand(true)
        .vexpand(true)
        .build();

    let error_banner = Label::builder()
        .wrap(true)
        .xalign(0.0)
        .visible(false)
        .build();
    error_banner.add_css_class("error-banner");
    main_column.append(&error_banner);

    let prompt_view = TextView::builder()
        .wrap_mode(gtk::WrapMode::WordChar)
        .build();
    let prompt_scroller = ScrolledWindow::builder()
        .min_content_height(90)
        .hexpand(true)
        .child(&prompt_view)
        .build();
    prompt_scroller.add_css_class("prompt-field");
    main_column.append(&labelled_row("What do you want to create?", &prompt_scroller));

    let enhance_button = Button::with_label("Enhance Prompt (Ollama)");
    enhance_button.set_halign(Align::End);
    enhance_button.set_sensitive(false);
    main_column.append(&enhance_button);

    let enhanced_row = GtkBox::builder()
        .orientation(Orientation::Vertical)
        .spacing(6)
        .visible(false)
        .build();
    let enhanced_header = GtkBox::builder()
        .orientation(Orientation::Horizontal)
        .spacing(8)
        .build();
    let enhanced_label = Label::builder()
        .label("Enhanced Prompt")
        .halign(Align::Start)
        .hexpand(true)
        .build();
    let clear_button = Button::with_label("Clear");
    clear_button.add_css_class("flat");
    clear_button.set_tooltip_text(Some("Clear enhanced prompt"));
    enhanced_header.append(&enhanced_label);
    enhanced_header.append(&clear_button);

    let enhanced_view = TextView::builder()
        .wrap_mode(gtk::WrapMode::WordChar)
        .build();
    let enhanced_scroller = ScrolledWindow::builder()
        .min_content_height(80)
        .hexpand(true)
        .child(&enhanced_view)
        .build();
    enhanced_scroller.add_css_class("prompt-field");
    enhanced_row.append(&enhanced_header);
    enhanced_row.append(&enhanced_scroller);
    main_column.append(&enhanced_row);

    let generate_button = Button::with_label("Generate Artwork");
    generate_button.add_css_class("suggested-action");
    generate_button.set_sensitive(false);
    main_column.append(&generate_button);

    // Result panel -----------------------------------------------------------

    let result_header = GtkBox::builder()
        .orientation(Orientation::Horizontal)
        .spacing(8)
        .build();
    let result_heading = Label::builder()
        .label("Generated Result")
        .halign(Align::Start)
        .hexpand(true)
        .build();
    result_heading.add_css_class("heading");
    let save_button = Button::with_label("Save Image");
    save_button.set_visible(false);
    result_header.append(&result_heading);
    result_header.append(&save_button);
    main_column.append(&result_header);

    let canvas = GtkBox::builder()
        .orientation(Orientation::Vertical)
        .spacing(8)
        .halign(Align::Fill)
        .vexpand(true)
        .height_request(420)
        .build();
    canvas.add_css_class("image-canvas");

    let result_spinner = gtk::Spinner::new();
    result_spinner.set_size_request(48, 48);
    result_spinner.set_halign(Align::Center);
    result_spinner.set_valign(Align::Center);
    result_spinner.set_vexpand(true);
    result_spinner.set_visible(false);

    let result_picture = gtk::Picture::new();
    result_picture.set_can_shrink(true);
    result_picture.set_vexpand(true);
    result_picture.set_visible(false);

    let placeholder_label = Label::builder()
        .label("Your creation will appear here")
        .halign(Align::Center)
        .valign(Align::Center)
        .vexpand(true)
        .build();
    placeholder_label.add_css_class("dim-label");

    canvas.append(&result_spinner);
    canvas.append(&result_picture);
    canvas.append(&placeholder_label);
    main_column.append(&canvas);

    columns.append(&settings_column);
    columns.append(&Separator::new(Orientation::Vertical));
    columns.append(&main_column);

    let scroller = ScrolledWindow::builder()
        .hexpand(true)
        .vexpand(true)
        .min_content_height(200)
        .child(&columns)
        .build();
    root.append(&scroller);

    // Wiring -----------------------------------------------------------------

    let probe_seq = Rc::new(RequestSeq::default());
    let enhance_seq = Rc::new(RequestSeq::default());
    let generate_seq = Rc::new(RequestSeq::default());

    let refresh_controls: Rc<dyn Fn()> = {
        let session = context.session.clone();
        let settings = context.settings.clone();
        let status_badge = status_badge.clone();
        let error_banner = error_banner.clone();
        let enhance_button = enhance_button.clone();
        let generate_button = generate_button.clone();
        let save_button = save_button.clone();
        let result_spinner = result_spinner.clone();
        let result_picture = result_picture.clone();
        let placeholder_label = placeholder_label.clone();
        Rc::new(move || {
            let state = session.snapshot();
            let model = settings.snapshot().model;

            match state.connectivity {
                Connectivity::Online => {
                    status_badge.set_label("Ollama Online");
                    status_badge.add_css_class("online");
                    status_badge.remove_css_class("offline");
                }
                Connectivity::Offline => {
                    status_badge.set_label("Ollama Offline");
                    status_badge.add_css_class("offline");
                    status_badge.remove_css_class("online");
                }
            }

            match &state.error {
                Some(message) => {
                    error_banner.set_label(message);
                    error_banner.set_visible(true);
                }
                None => error_banner.set_visible(false),
            }

            enhance_button.set_sensitive(state.can_enhance(model.as_deref()));
            enhance_button.set_label(if state.is_enhancing {
                "Enhancing…"
            } else {
                "Enhance Prompt (Ollama)"
            });

            generate_button.set_sensitive(state.can_generate());
            generate_button.set_label(if state.is_generating {
                "Generating Image…"
            } else {
                "Generate Artwork"
            });

            let has_image = state.image.is_some();
            result_spinner.set_visible(state.is_generating);
            result_spinner.set_spinning(state.is_generating);
            result_picture.set_visible(!state.is_generating && has_image);
            placeholder_label.set_visible(!state.is_generating && !has_image);
            save_button.set_visible(!state.is_generating && has_image);
        })
    };

    // Probes are last-URL-wins: each takes a fresh id and the completion is
    // dropped unless its id is still current when it lands.
    let refresh_models: Rc<dyn Fn()> = {
        let context = context.clone();
        let ollama_entry = ollama_entry.clone();
        let model_dropdown = model_dropdown.clone();
        let probe_seq = Rc::clone(&probe_seq);
        let refresh_controls = refresh_controls.clone();
        Rc::new(move || {
            let url = ollama_entry.text().trim().to_string();
            let probe_id = probe_seq.next();
            let handle = context.ollama.list_models(url.clone());

            let session = context.session.clone();
            let settings = context.settings.clone();
            let model_dropdown = model_dropdown.clone();
            let probe_seq = Rc::clone(&probe_seq);
            let refresh_controls = refresh_controls.clone();

            adw::glib::MainContext::default().spawn_local(async move {
                let outcome = handle.await;
                if !probe_seq.is_current(probe_id) {
                    return;
                }

                match outcome {
                    Ok(Ok(models)) => {
                        session.update(|state| {
                            state.connectivity = Connectivity::Online;
                            state.models = models.clone();
                        });
                        let selected = settings
                            .snapshot()
                            .model
                            .or_else(|| models.first().map(|model| model.name.clone()));
                        if let Some(name) = &selected {
                            settings.update(|s| s.model = Some(name.clone()));
                        }
                        rebuild_model_dropdown(&model_dropdown, &models, selected.as_deref());
                    }
                    Ok(Err(err)) => {
                        warn!("Could not connect to Ollama at {url}: {err:#}");
                        session.update(|state| state.connectivity = Connectivity::Offline);
                    }
                    Err(join_err) => {
                        warn!("Connectivity probe task failed: {join_err}");
                        session.update(|state| state.connectivity = Connectivity::Offline);
                    }
                }
                refresh_controls();
            });
        })
    };

    {
        let settings = context.settings.clone();
        let refresh_models = refresh_models.clone();
        ollama_entry.connect_changed(move |entry| {
            let url = entry.text().to_string();
            settings.update(|s| s.ollama_url = url);
            refresh_models();
        });
    }

    {
        let settings = context.settings.clone();
        sd_entry.connect_changed(move |entry| {
            let url = entry.text().to_string();
            settings.update(|s| s.sd_url = url);
        });
    }

    {
        let settings = context.settings.clone();
        let refresh_controls = refresh_controls.clone();
        model_dropdown.connect_changed(move |combo| {
            // A probe failure or empty list never clears an earlier choice.
            if let Some(id) = combo.active_id() {
                settings.update(|s| s.model = Some(id.to_string()));
            }
            refresh_controls();
        });
    }

    {
        let session = context.session.clone();
        let refresh_controls = refresh_controls.clone();
        prompt_view.buffer().connect_changed(move |buffer| {
            let text = buffer
                .text(&buffer.start_iter(), &buffer.end_iter(), false)
                .to_string();
            session.update(|state| state.raw_prompt = text);
            refresh_controls();
        });
    }

    {
        let session = context.session.clone();
        let refresh_controls = refresh_controls.clone();
        enhanced_view.buffer().connect_changed(move |buffer| {
            let text = buffer
                .text(&buffer.start_iter(), &buffer.end_iter(), false)
                .to_string();
            session.update(|state| {
                state.enhanced_prompt = (!text.is_empty()).then_some(text);
            });
            refresh_controls();
        });
    }

    {
        let session = context.session.clone();
        let enhanced_view = enhanced_view.clone();
        let enhanced_row = enhanced_row.clone();
        let refresh_controls = refresh_controls.clone();
        clear_button.connect_clicked(move |_| {
            enhanced_view.buffer().set_text("");
            session.update(|state| state.enhanced_prompt = None);
            enhanced_row.set_visible(false);
            refresh_controls();
        });
    }

    {
        let context = context.clone();
        let enhanced_view = enhanced_view.clone();
        let enhanced_row = enhanced_row.clone();
        let enhance_seq = Rc::clone(&enhance_seq);
        let refresh_controls = refresh_controls.clone();
        enhance_button.connect_clicked(move |_| {
            let state = context.session.snapshot();
            let settings = context.settings.snapshot();
            let concept = state.raw_prompt.trim().to_string();
            let Some(model) = settings.model else {
                return;
            };
            if concept.is_empty() {
                return;
            }

            context.session.update(|state| {
                state.is_enhancing = true;
                state.error = None;
            });
            refresh_controls();

            let request_id = enhance_seq.next();
            let handle = context
                .ollama
                .enhance_prompt(settings.ollama_url, model, concept);

            let session = context.session.clone();
            let enhanced_view = enhanced_view.clone();
            let enhanced_row = enhanced_row.clone();
            let enhance_seq = Rc::clone(&enhance_seq);
            let refresh_controls = refresh_controls.clone();

            adw::glib::MainContext::default().spawn_local(async move {
                let outcome = handle.await;
                if !enhance_seq.is_current(request_id) {
                    return;
                }

                session.update(|state| state.is_enhancing = false);
                match outcome {
                    Ok(Ok(text)) => {
                        enhanced_view.buffer().set_text(&text);
                        session.update(|state| state.enhanced_prompt = Some(text));
                        enhanced_row.set_visible(true);
                    }
                    Ok(Err(err)) => {
                        warn!("Prompt enhancement failed: {err:#}");
                        session
                            .update(|state| state.error = Some(ENHANCE_FAILED_MESSAGE.to_string()));
                    }
                    Err(join_err) => {
                        warn!("Prompt enhancement task failed: {join_err}");
                        session
                            .update(|state| state.error = Some(ENHANCE_FAILED_MESSAGE.to_string()));
                    }
                }
                refresh_controls();
            });
        });
    }

    {
        let context = context.clone();
        let result_picture = result_picture.clone();
        let generate_seq = Rc::clone(&generate_seq);
        let refresh_controls = refresh_controls.clone();
        generate_button.connect_clicked(move |_| {
            let state = context.session.snapshot();
            let Some(prompt) = state.effective_prompt() else {
                return;
            };
            let sd_url = context.settings.snapshot().sd_url;

            context.session.update(|state| {
                state.is_generating = true;
                state.error = None;
                state.image = None;
            });
            result_picture.set_paintable(Option::<&gdk::Texture>::None);
            refresh_controls();

            let request_id = generate_seq.next();
            let handle = context.diffusion.txt2img(sd_url.clone(), prompt);

            let session = context.session.clone();
            let result_picture = result_picture.clone();
            let generate_seq = Rc::clone(&generate_seq);
            let refresh_controls = refresh_controls.clone();

            adw::glib::MainContext::default().spawn_local(async move {
                let outcome = handle.await;
                if !generate_seq.is_current(request_id) {
                    return;
                }

                session.update(|state| state.is_generating = false);
                match outcome {
                    Ok(Ok(image)) => {
                        let texture = image
                            .png_bytes()
                            .ok()
                            .and_then(|bytes| texture_from_image_bytes(&bytes));
                        match texture {
                            Some(texture) => {
                                result_picture.set_paintable(Some(&texture));
                                session.update(|state| state.image = Some(image));
                            }
                            None => {
                                warn!("Failed to decode the generated PNG payload.");
                                session.update(|state| {
                                    state.error = Some(generate_failed_message(&sd_url));
                                });
                            }
                        }
                    }
                    Ok(Err(err)) => {
                        warn!("Image generation failed: {err:#}");
                        session.update(|state| {
                            state.error = Some(generate_failed_message(&sd_url));
                        });
                    }
                    Err(join_err) => {
                        warn!("Image generation task failed: {join_err}");
                        session.update(|state| {
                            state.error = Some(generate_failed_message(&sd_url));
                        });
                    }
                }
                refresh_controls();
            });
        });
    }

    {
        let session = context.session.clone();
        let overlay = overlay.clone();
        save_button.connect_clicked(move |_| {
            let Some(image) = session.snapshot().image else {
                return;
            };
            open_save_dialog(overlay.clone(), image);
        });
    }

    refresh_controls();
    refresh_models();

    overlay.set_child(Some(&root));
    overlay
}

fn rebuild_model_dropdown(dropdown: &ComboBoxText, models: &[ModelInfo], selected: Option<&str>) {
    dropdown.remove_all();

    if models.is_empty() {
        dropdown.append(None, NO_MODELS_LABEL);
        dropdown.set_active(Some(0));
        dropdown.set_sensitive(false);
        return;
    }

    for model in models {
        dropdown.append(Some(&model.name), &model.name);
    }
    dropdown.set_sensitive(true);
    if let Some(name) = selected {
        dropdown.set_active_id(Some(name));
    }
    if dropdown.active().is_none() {
        dropdown.set_active(Some(0));
    }
}

fn open_save_dialog(overlay: ToastOverlay, image: GeneratedImage) {
    let window = match overlay
        .root()
        .and_then(|root| root.downcast::<ApplicationWindow>().ok())
    {
        Some(window) => window,
        None => {
            overlay.add_toast(Toast::new("Could not determine top-level window."));
            return;
        }
    };

    let chooser = FileChooserNative::builder()
        .title("Save Generated Image")
        .accept_label("Save")
        .cancel_label("Cancel")
        .modal(true)
        .transient_for(&window)
        .action(FileChooserAction::Save)
        .build();
    chooser.set_current_name("generated-image.png");

    let chooser_keepalive = chooser.clone();
    chooser.connect_response(move |dialog, response| {
        let _keepalive = chooser_keepalive.clone();

        if response == ResponseType::Accept {
            if let Some(path) = dialog.file().and_then(|file| file.path()) {
                let written = image
                    .png_bytes()
                    .and_then(|bytes| fs::write(&path, bytes).map_err(anyhow::Error::from));
                match written {
                    Ok(()) => {
                        overlay.add_toast(Toast::new(&format!("Saved {}", path.display())));
                    }
                    Err(err) => {
                        warn!("Failed to save image to {}: {err:#}", path.display());
                        overlay.add_toast(Toast::new(&format!("Failed to save image: {err}")));
                    }
                }
            }
        }

        dialog.destroy();
    });

    chooser.show();
}

fn labelled_row(label: &str, widget: &impl IsA<gtk::Widget>) -> GtkBox {
    let row = GtkBox::builder()
        .orientation(Orientation::Vertical)
        .spacing(6)
        .build();

    let label = Label::builder().label(label).halign(Align::Start).build();

    row.append(&label);
    row.append(widget);
    row
}

fn texture_from_image_bytes(bytes: &[u8]) -> Option<gdk::Texture> {
    let loader = PixbufLoader::new();
    loader.write(bytes).ok()?;
    loader.close().ok()?;
    let pixbuf = loader.pixbuf()?;
    Some(gdk::Texture::for_pixbuf(&pixbuf))
}
