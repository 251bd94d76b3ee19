use crate::{
    config::SettingsStore, diffusion::DiffusionClient, ollama::OllamaClient, state::SessionStore,
    ui,
};
use adw::glib;
use adw::{gio::ApplicationFlags, prelude::*, Application};
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};

pub const APP_ID: &str = "dev.lumina.LuminaGen";

#[derive(Clone)]
pub struct AppContext {
    pub runtime: Arc<Runtime>,
    pub settings: Arc<SettingsStore>,
    pub session: Arc<SessionStore>,
    pub ollama: Arc<OllamaClient>,
    pub diffusion: Arc<DiffusionClient>,
}

pub struct LuminaGenApp {
    application: Application,
    context: AppContext,
}

impl LuminaGenApp {
    pub fn new() -> Result<Self> {
        let runtime = Arc::new(
            Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| anyhow!("failed to create Tokio runtime: {err}"))?,
        );

        let application = Application::builder()
            .application_id(APP_ID)
            .flags(ApplicationFlags::empty())
            .build();

        let settings = Arc::new(SettingsStore::new());
        let session = Arc::new(SessionStore::new());
        let ollama = Arc::new(OllamaClient::new(runtime.clone())?);
        let diffusion = Arc::new(DiffusionClient::new(runtime.clone())?);

        let context = AppContext {
            runtime,
            settings,
            session,
            ollama,
            diffusion,
        };

        Ok(Self {
            application,
            context,
        })
    }

    pub fn run(self) -> Result<()> {
        let context = self.context.clone();
        self.application.connect_activate(move |app| {
            if let Err(err) = ui::bootstrap(app, context.clone()) {
                glib::g_warning!(APP_ID, "failed to initialize UI: {err}");
            }
        });

        let exit_status = self.application.run();
        if exit_status == glib::ExitCode::SUCCESS {
            Ok(())
        } else {
            Err(anyhow!(
                "application exited with status code {}",
                exit_status.value()
            ))
        }
    }
}
