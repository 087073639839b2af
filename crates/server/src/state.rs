use std::sync::Arc;

use leadline_calendar::CalendarClient;
use leadline_core::api_keys::ApiKeyCache;
use leadline_core::config::AppConfig;
use leadline_db::RecordStore;
use leadline_whatsapp::MessagingClient;

use crate::bootstrap::BootstrapError;
use crate::commands::CommandHandlers;
use crate::dispatch::Dispatcher;
use crate::intake::IntakeOrchestrator;
use crate::relay::ReplyRelay;
use crate::scheduling::SchedulingService;

/// Shared handles behind every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub store: RecordStore,
    pub messaging: Arc<dyn MessagingClient>,
    pub api_keys: Arc<ApiKeyCache>,
    pub intake: Arc<IntakeOrchestrator>,
    pub commands: Arc<CommandHandlers>,
    pub scheduling: Arc<SchedulingService>,
    pub relay: Arc<ReplyRelay>,
}

impl AppState {
    pub fn from_parts(
        config: &AppConfig,
        store: RecordStore,
        messaging: Arc<dyn MessagingClient>,
        calendar: Arc<dyn CalendarClient>,
        api_keys: Arc<ApiKeyCache>,
    ) -> Result<Self, BootstrapError> {
        let dispatcher = Dispatcher::new(Arc::clone(&messaging), &config.dispatch)
            .map_err(BootstrapError::HttpClient)?;
        let hours = config.scheduling.working_hours()?;

        Ok(Self {
            intake: Arc::new(IntakeOrchestrator::new(store.clone(), dispatcher.clone())),
            commands: Arc::new(CommandHandlers::new(store.clone(), dispatcher)),
            scheduling: Arc::new(SchedulingService::new(
                store.clone(),
                calendar,
                hours,
                config.scheduling.default_duration_minutes,
            )),
            relay: Arc::new(ReplyRelay::new(store.clone(), Arc::clone(&messaging))),
            store,
            messaging,
            api_keys,
        })
    }
}
