use crate::domain::merchant::Psp;
use crate::gateways::PspGateway;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Provider lookup built once at startup and shared read-only.
#[derive(Clone, Default)]
pub struct PspRegistry {
    gateways: Arc<HashMap<Psp, Arc<dyn PspGateway>>>,
}

impl PspRegistry {
    pub fn new(gateways: Vec<Arc<dyn PspGateway>>) -> Self {
        let mut map: HashMap<Psp, Arc<dyn PspGateway>> = HashMap::new();
        for gateway in gateways {
            let psp = gateway.provider();
            if map.insert(psp, gateway).is_some() {
                warn!(psp = %psp, "duplicate gateway registration, keeping the last one");
            }
        }
        Self {
            gateways: Arc::new(map),
        }
    }

    pub fn find(&self, psp: Psp) -> Option<Arc<dyn PspGateway>> {
        self.gateways.get(&psp).cloned()
    }

    pub fn providers(&self) -> Vec<Psp> {
        self.gateways.keys().copied().collect()
    }
}
