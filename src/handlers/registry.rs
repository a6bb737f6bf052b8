use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

use crate::handlers::SessionController;
use crate::services::GenerativeModel;

/// Live sessions by id. Every session gets its own controller, state and
/// cache; the model client is the only thing they share.
pub struct SessionRegistry {
    model: Arc<dyn GenerativeModel>,
    sessions: RwLock<HashMap<Uuid, Arc<SessionController>>>,
}

impl SessionRegistry {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self {
            model,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn create(&self) -> Arc<SessionController> {
        let id = Uuid::new_v4();
        let session = Arc::new(SessionController::new(id, self.model.clone()));

        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, session.clone());

        log::info!("🆕 Session {} created", session.id());
        session
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<SessionController>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn remove(&self, id: &Uuid) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some();

        if removed {
            log::info!("👋 Session {} closed", id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Drop sessions idle for longer than `max_idle`. Busy sessions stay.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now() - max_idle;
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();

        sessions.retain(|_, session| session.is_busy() || session.last_activity() > cutoff);

        let removed = before - sessions.len();
        if removed > 0 {
            log::info!("🧹 Swept {} idle session(s), {} remaining", removed, sessions.len());
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ai_service::testing::StubModel;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(Arc::new(StubModel::replying("report")))
    }

    #[test]
    fn test_sessions_are_isolated() {
        let registry = registry();
        let first = registry.create();
        let second = registry.create();
        assert_ne!(first.id(), second.id());
        assert_eq!(registry.len(), 2);

        let png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        first.on_image_uploaded(png, None).unwrap();

        assert!(registry.get(&first.id()).unwrap().snapshot().image_format.is_some());
        assert!(registry.get(&second.id()).unwrap().snapshot().image_format.is_none());
    }

    #[test]
    fn test_remove_unknown_session() {
        let registry = registry();
        let session = registry.create();

        assert!(registry.remove(&session.id()));
        assert!(!registry.remove(&session.id()));
        assert!(registry.get(&session.id()).is_none());
    }

    #[test]
    fn test_sweep_keeps_recent_sessions() {
        let registry = registry();
        registry.create();
        registry.create();

        assert_eq!(registry.sweep_idle(Duration::minutes(30)), 0);
        assert_eq!(registry.len(), 2);

        // Everything is older than "zero idle time ago" once a moment has passed.
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(registry.sweep_idle(Duration::zero()), 2);
        assert_eq!(registry.len(), 0);
    }
}
