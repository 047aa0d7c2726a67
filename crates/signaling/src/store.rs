//! Schnittstellen zu externen Speichern
//!
//! Der Koordinator haelt Presence, Queue und Sessions nur im Speicher. Was
//! ausserhalb davon sichtbar sein muss, geht ueber diese Traits:
//! - `PresenceStore`: dauerhaftes Online-Flag (wird beim Start zurueckgesetzt)
//! - `BlockStore`: gegenseitige Sperrlisten fuer Matchmaking und Direktanrufe
//!
//! Die In-Memory-Implementierungen werden vom Server und in Tests verwendet.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use unilink_core::{PrincipalId, Result};

/// Dauerhafter Online-Status eines Principals
#[async_trait]
pub trait PresenceStore: Send + Sync + 'static {
    async fn set_online(&self, principal: &PrincipalId, online: bool) -> Result<()>;

    /// Setzt alle Principals auf offline (Aufruf beim Prozessstart)
    async fn reset_all_offline(&self) -> Result<usize>;
}

/// Gegenseitige Sperrlisten
#[async_trait]
pub trait BlockStore: Send + Sync + 'static {
    /// Alle Principals, die `principal` gesperrt hat oder von denen er gesperrt wurde
    async fn excluded_for(&self, principal: &PrincipalId) -> Result<HashSet<PrincipalId>>;
}

// ---------------------------------------------------------------------------
// In-Memory-Implementierungen
// ---------------------------------------------------------------------------

/// Presence-Store im Speicher
#[derive(Debug, Default)]
pub struct InMemoryPresenceStore {
    online: RwLock<HashSet<PrincipalId>>,
}

impl InMemoryPresenceStore {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Vorbelegung, z.B. um einen Neustart nach unsauberem Ende zu simulieren
    pub fn mit_online(principals: impl IntoIterator<Item = PrincipalId>) -> Self {
        Self {
            online: RwLock::new(principals.into_iter().collect()),
        }
    }

    pub fn ist_online(&self, principal: &PrincipalId) -> bool {
        self.online.read().contains(principal)
    }

    pub fn online_anzahl(&self) -> usize {
        self.online.read().len()
    }
}

#[async_trait]
impl PresenceStore for InMemoryPresenceStore {
    async fn set_online(&self, principal: &PrincipalId, online: bool) -> Result<()> {
        let mut menge = self.online.write();
        if online {
            menge.insert(principal.clone());
        } else {
            menge.remove(principal);
        }
        Ok(())
    }

    async fn reset_all_offline(&self) -> Result<usize> {
        let mut menge = self.online.write();
        let anzahl = menge.len();
        menge.clear();
        Ok(anzahl)
    }
}

/// Sperrliste im Speicher
#[derive(Debug, Default)]
pub struct InMemoryBlockStore {
    /// (blockierer, blockierter)
    sperren: RwLock<HashSet<(PrincipalId, PrincipalId)>>,
}

impl InMemoryBlockStore {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn blockieren(&self, blockierer: &PrincipalId, blockierter: &PrincipalId) {
        self.sperren
            .write()
            .insert((blockierer.clone(), blockierter.clone()));
    }

    pub fn entsperren(&self, blockierer: &PrincipalId, blockierter: &PrincipalId) -> bool {
        self.sperren
            .write()
            .remove(&(blockierer.clone(), blockierter.clone()))
    }
}

#[async_trait]
impl BlockStore for InMemoryBlockStore {
    async fn excluded_for(&self, principal: &PrincipalId) -> Result<HashSet<PrincipalId>> {
        let sperren = self.sperren.read();
        let ausgeschlossen = sperren
            .iter()
            .filter_map(|(a, b)| {
                if a == principal {
                    Some(b.clone())
                } else if b == principal {
                    Some(a.clone())
                } else {
                    None
                }
            })
            .collect();
        Ok(ausgeschlossen)
    }
}
