//! Matchmaking-Queue – zufaellige Paarung wartender Principals
//!
//! Ein Principal steht hoechstens einmal in der Queue. Erneutes Einreihen
//! ersetzt den bestehenden Eintrag an seiner Position. Die Auswahl eines
//! Partners ist gleichverteilt ueber alle zulaessigen Eintraege, Ausschluesse
//! (Block-Liste) kommen vom Aufrufer.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use unilink_core::PrincipalId;
use unilink_protocol::PeerInfo;

/// Ein wartender Principal
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub principal_id: PrincipalId,
    pub display_name: Option<String>,
    pub joined_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn neu(principal_id: PrincipalId, display_name: Option<String>) -> Self {
        Self {
            principal_id,
            display_name,
            joined_at: Utc::now(),
        }
    }

    /// Oeffentliche Sicht auf den Eintrag (fuer `match_found`)
    pub fn peer_info(&self) -> PeerInfo {
        PeerInfo::neu(self.principal_id.clone(), self.display_name.clone())
    }
}

/// Ergebnis von [`MatchQueue::match_or_enqueue`]
#[derive(Debug, Clone, PartialEq)]
pub enum MatchErgebnis {
    /// Partner gefunden, beide sind aus der Queue entfernt
    Gefunden(QueueEntry),
    /// Kein Partner, der Anfragende wartet an dieser Position (1-basiert)
    Wartend { position: usize },
}

/// Die Warteschlange
///
/// Clone teilt den inneren Zustand.
#[derive(Clone, Default)]
pub struct MatchQueue {
    eintraege: Arc<Mutex<Vec<QueueEntry>>>,
}

impl MatchQueue {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Reiht einen Principal ein (oder ersetzt seinen Eintrag)
    ///
    /// Gibt die 1-basierte Position zurueck.
    pub fn enqueue(&self, eintrag: QueueEntry) -> usize {
        let mut eintraege = self.eintraege.lock();
        Self::einreihen(&mut eintraege, eintrag)
    }

    fn einreihen(eintraege: &mut Vec<QueueEntry>, eintrag: QueueEntry) -> usize {
        if let Some(idx) = eintraege
            .iter()
            .position(|e| e.principal_id == eintrag.principal_id)
        {
            eintraege[idx] = eintrag;
            idx + 1
        } else {
            eintraege.push(eintrag);
            eintraege.len()
        }
    }

    /// Entfernt einen Principal; `true` wenn er in der Queue stand
    pub fn dequeue(&self, principal: &PrincipalId) -> bool {
        let mut eintraege = self.eintraege.lock();
        let vorher = eintraege.len();
        eintraege.retain(|e| &e.principal_id != principal);
        vorher != eintraege.len()
    }

    /// Sucht einen zufaelligen Partner fuer `principal`
    ///
    /// Zulaessig ist jeder Eintrag ausser dem Anfragenden selbst und allen
    /// Principals in `ausgeschlossen`. Bei Erfolg werden der Partner und ein
    /// eventueller eigener Eintrag des Anfragenden entfernt. Ohne zulaessigen
    /// Partner bleibt die Queue unveraendert.
    pub fn try_match(
        &self,
        principal: &PrincipalId,
        ausgeschlossen: &HashSet<PrincipalId>,
    ) -> Option<QueueEntry> {
        let mut eintraege = self.eintraege.lock();
        Self::partner_ziehen(&mut eintraege, principal, ausgeschlossen)
    }

    fn partner_ziehen(
        eintraege: &mut Vec<QueueEntry>,
        principal: &PrincipalId,
        ausgeschlossen: &HashSet<PrincipalId>,
    ) -> Option<QueueEntry> {
        let kandidaten: Vec<usize> = eintraege
            .iter()
            .enumerate()
            .filter(|(_, e)| {
                &e.principal_id != principal && !ausgeschlossen.contains(&e.principal_id)
            })
            .map(|(i, _)| i)
            .collect();

        if kandidaten.is_empty() {
            return None;
        }

        let wahl = kandidaten[rand::thread_rng().gen_range(0..kandidaten.len())];
        let partner = eintraege.remove(wahl);
        eintraege.retain(|e| &e.principal_id != principal);

        tracing::debug!(
            principal = %principal,
            partner = %partner.principal_id,
            wartend = eintraege.len(),
            "Match gefunden"
        );
        Some(partner)
    }

    /// Sucht einen Partner und reiht den Anfragenden andernfalls ein
    ///
    /// Beides geschieht unter einem Lock, zwei gleichzeitige `join_queue`
    /// koennen sich also nicht gegenseitig verpassen.
    pub fn match_or_enqueue(
        &self,
        eintrag: QueueEntry,
        ausgeschlossen: &HashSet<PrincipalId>,
    ) -> MatchErgebnis {
        let mut eintraege = self.eintraege.lock();
        match Self::partner_ziehen(&mut eintraege, &eintrag.principal_id, ausgeschlossen) {
            Some(partner) => MatchErgebnis::Gefunden(partner),
            None => MatchErgebnis::Wartend {
                position: Self::einreihen(&mut eintraege, eintrag),
            },
        }
    }

    /// Anzahl wartender Principals
    pub fn size(&self) -> usize {
        self.eintraege.lock().len()
    }

    pub fn enthaelt(&self, principal: &PrincipalId) -> bool {
        self.eintraege
            .lock()
            .iter()
            .any(|e| &e.principal_id == principal)
    }

    /// 1-basierte Position eines Principals
    pub fn position(&self, principal: &PrincipalId) -> Option<usize> {
        self.eintraege
            .lock()
            .iter()
            .position(|e| &e.principal_id == principal)
            .map(|i| i + 1)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn eintrag(id: &str) -> QueueEntry {
        QueueEntry::neu(PrincipalId::new(id), Some(format!("Name {id}")))
    }

    fn p(id: &str) -> PrincipalId {
        PrincipalId::new(id)
    }

    #[test]
    fn enqueue_ersetzt_bestehenden_eintrag() {
        let q = MatchQueue::neu();
        assert_eq!(q.enqueue(eintrag("A")), 1);
        assert_eq!(q.enqueue(eintrag("B")), 2);
        assert_eq!(q.enqueue(eintrag("A")), 1);
        assert_eq!(q.size(), 2);
    }

    #[test]
    fn dequeue_entfernt_nur_den_principal() {
        let q = MatchQueue::neu();
        q.enqueue(eintrag("A"));
        q.enqueue(eintrag("B"));
        assert!(q.dequeue(&p("A")));
        assert!(!q.dequeue(&p("A")));
        assert_eq!(q.position(&p("B")), Some(1));
    }

    #[test]
    fn leere_queue_liefert_kein_match() {
        let q = MatchQueue::neu();
        assert!(q.try_match(&p("A"), &HashSet::new()).is_none());
    }

    #[test]
    fn kein_selbst_match() {
        let q = MatchQueue::neu();
        q.enqueue(eintrag("A"));
        assert!(q.try_match(&p("A"), &HashSet::new()).is_none());
        assert_eq!(q.size(), 1, "Queue muss unveraendert bleiben");
    }

    #[test]
    fn ausgeschlossene_werden_nie_gewaehlt() {
        let q = MatchQueue::neu();
        q.enqueue(eintrag("B"));
        q.enqueue(eintrag("C"));
        let ausgeschlossen: HashSet<_> = [p("B")].into_iter().collect();

        for _ in 0..20 {
            let partner = q.try_match(&p("A"), &ausgeschlossen).unwrap();
            assert_eq!(partner.principal_id, p("C"));
            q.enqueue(partner);
        }
    }

    #[test]
    fn nur_ausgeschlossene_liefert_none() {
        let q = MatchQueue::neu();
        q.enqueue(eintrag("B"));
        let ausgeschlossen: HashSet<_> = [p("B")].into_iter().collect();
        assert!(q.try_match(&p("A"), &ausgeschlossen).is_none());
        assert_eq!(q.size(), 1);
    }

    #[test]
    fn match_entfernt_beide_eintraege() {
        let q = MatchQueue::neu();
        q.enqueue(eintrag("A"));
        q.enqueue(eintrag("B"));
        let partner = q.try_match(&p("A"), &HashSet::new()).unwrap();
        assert_eq!(partner.principal_id, p("B"));
        assert_eq!(q.size(), 0);
    }

    #[test]
    fn match_or_enqueue_reiht_ein_ohne_partner() {
        let q = MatchQueue::neu();
        let ergebnis = q.match_or_enqueue(eintrag("A"), &HashSet::new());
        assert_eq!(ergebnis, MatchErgebnis::Wartend { position: 1 });

        match q.match_or_enqueue(eintrag("B"), &HashSet::new()) {
            MatchErgebnis::Gefunden(partner) => assert_eq!(partner.principal_id, p("A")),
            other => panic!("Match erwartet, war {other:?}"),
        }
        assert_eq!(q.size(), 0);
    }

    #[test]
    fn auswahl_ist_ungefaehr_gleichverteilt() {
        let q = MatchQueue::neu();
        let mut treffer_b = 0;
        for _ in 0..400 {
            q.enqueue(eintrag("B"));
            q.enqueue(eintrag("C"));
            let partner = q.try_match(&p("A"), &HashSet::new()).unwrap();
            if partner.principal_id == p("B") {
                treffer_b += 1;
            }
            q.dequeue(&p("B"));
            q.dequeue(&p("C"));
        }
        assert!((100..300).contains(&treffer_b), "B gewaehlt: {treffer_b}");
    }

    #[test]
    fn peer_info_traegt_anzeigenamen() {
        let info = eintrag("A").peer_info();
        assert_eq!(info.id, p("A"));
        assert_eq!(info.display_name.as_deref(), Some("Name A"));
    }
}
