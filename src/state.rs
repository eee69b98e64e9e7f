use std::sync::Arc;

use crate::config::Config;
use crate::pipeline::Stylist;

#[derive(Clone)]
pub struct AppState {
    pub stylist: Arc<Stylist>,
}

impl AppState {
    pub fn new(stylist: Stylist) -> Self {
        Self {
            stylist: Arc::new(stylist),
        }
    }

    pub fn config(&self) -> &Config {
        self.stylist.config()
    }
}
