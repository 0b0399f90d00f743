//! Fixture builders for modules and a wired delegate

#![allow(dead_code)]

use super::mocks::{MockHandler, MockSession, MockStore};
use satchel_core::{CourseId, CourseModule, ModuleFile, ModuleId, PackageId, PrefetchConfig};
use satchel_prefetch::PrefetchDelegate;
use std::sync::Arc;

pub const COURSE: CourseId = 2;
pub const SITE: &str = "site-a";

/// pluginfile URL carrying a revision, as the remote content service
/// builds them
pub fn file_url(module_id: ModuleId, revision: u64, name: &str) -> String {
    format!(
        "https://lms.example/pluginfile.php/{}/mod_resource/content/{}/{}",
        module_id, revision, name
    )
}

pub fn module(id: ModuleId, modname: &str) -> CourseModule {
    CourseModule::new(id, modname)
}

/// Module with one file per `(name, size)`, all at revision 1
pub fn module_with_files(id: ModuleId, modname: &str, files: &[(&str, u64)]) -> CourseModule {
    let contents = files
        .iter()
        .map(|(name, size)| ModuleFile::new(file_url(id, 1, name), *size, 1_700_000_000))
        .collect();
    CourseModule::new(id, modname).with_contents(contents)
}

pub fn package(component: &str, module_id: ModuleId) -> PackageId {
    PackageId::new(component, module_id)
}

/// A delegate over fresh mocks, logged in to [`SITE`]
pub struct Harness {
    pub delegate: PrefetchDelegate,
    pub store: Arc<MockStore>,
    pub session: Arc<MockSession>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_session(MockSession::logged_in(SITE))
    }

    pub fn with_session(session: Arc<MockSession>) -> Self {
        let store = MockStore::new();
        let delegate =
            PrefetchDelegate::new(store.clone(), session.clone(), PrefetchConfig::default()).unwrap();
        Self {
            delegate,
            store,
            session,
        }
    }

    /// Register handlers under their modname and enable them
    pub async fn with_handlers(self, handlers: &[(&str, Arc<MockHandler>)]) -> Self {
        for (modname, handler) in handlers {
            self.delegate
                .register_handler(&format!("addon_{}", modname), modname, handler.clone());
        }
        assert!(self.delegate.update_enablement().await);
        self
    }
}

/// Yield until `condition` holds, giving spawned tasks a chance to run
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
