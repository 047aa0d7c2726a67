//! Call-Lifecycle – Autoritative State Machine aller Calls
//!
//! ## State Machine
//! ```text
//! pending --accept--> ongoing --end--> completed
//!    |
//!    +----reject----> rejected
//! ```
//! `rejected` und `completed` sind terminal. Jede Operation prueft den
//! aktuellen Status bevor sie etwas aendert und liefert bei unzulaessigen
//! Uebergaengen `UngueltigerUebergang`, ohne den Call zu veraendern.
//!
//! ## Invariante
//! Pro Principal existiert hoechstens ein Call mit Status `pending` oder
//! `ongoing`. Der Index `aktiv` wird unter demselben Lock wie die Call-Tabelle
//! gepflegt, Pruefen-und-Anlegen ist daher atomar.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use unilink_core::{CallId, CallToken, CoordinatorError, PrincipalId, Result};

// ---------------------------------------------------------------------------
// CallStatus
// ---------------------------------------------------------------------------

/// Status eines Calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Pending,
    Ongoing,
    Rejected,
    Completed,
}

impl CallStatus {
    /// `pending` oder `ongoing`
    pub fn ist_aktiv(&self) -> bool {
        matches!(self, Self::Pending | Self::Ongoing)
    }

    pub fn ist_terminal(&self) -> bool {
        !self.ist_aktiv()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ongoing => "ongoing",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Call
// ---------------------------------------------------------------------------

/// Ein Call zwischen genau zwei Principals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub id: CallId,
    pub initiator_id: PrincipalId,
    pub receiver_id: PrincipalId,
    pub status: CallStatus,
    pub call_token: CallToken,
    /// Solange `pending`: Erstellungszeitpunkt. Ab `accept`: Medienbeginn.
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Nur bei `completed` gesetzt
    pub duration_seconds: Option<i64>,
}

impl Call {
    /// Prueft ob der Principal Teilnehmer dieses Calls ist
    pub fn ist_teilnehmer(&self, principal: &PrincipalId) -> bool {
        &self.initiator_id == principal || &self.receiver_id == principal
    }

    /// Gibt den jeweils anderen Teilnehmer zurueck
    pub fn gegenueber(&self, principal: &PrincipalId) -> Option<&PrincipalId> {
        if &self.initiator_id == principal {
            Some(&self.receiver_id)
        } else if &self.receiver_id == principal {
            Some(&self.initiator_id)
        } else {
            None
        }
    }

    fn uebergang_fehler(&self, aktion: &'static str) -> CoordinatorError {
        CoordinatorError::UngueltigerUebergang {
            status: self.status.to_string(),
            aktion,
        }
    }

    /// Zeitpunkt fuer die Verlaufs-Sortierung
    fn verlauf_zeitpunkt(&self) -> DateTime<Utc> {
        self.ended_at.unwrap_or(self.started_at)
    }
}

/// Ganze Sekunden zwischen zwei Zeitpunkten (gerundet, nie negativ)
fn dauer_sekunden(von: DateTime<Utc>, bis: DateTime<Utc>) -> i64 {
    let millis = (bis - von).num_milliseconds().max(0);
    (millis + 500) / 1000
}

/// Generiert einen unratbaren Call-Token (URL-sicheres Base64, 32 Bytes)
fn call_token_generieren() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

// ---------------------------------------------------------------------------
// CallRegistry
// ---------------------------------------------------------------------------

/// Zeitquelle der Registry (austauschbar fuer Tests)
pub type Uhr = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Verwaltet alle Calls und erzwingt die Lifecycle-Regeln
///
/// Thread-safe via Arc + Mutex. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct CallRegistry {
    inner: Arc<Mutex<CallTabelle>>,
    uhr: Uhr,
}

#[derive(Default)]
struct CallTabelle {
    calls: HashMap<CallId, Call>,
    /// Principal -> sein aktiver Call (pending/ongoing)
    aktiv: HashMap<PrincipalId, CallId>,
    /// Token -> Call
    nach_token: HashMap<CallToken, CallId>,
}

impl CallTabelle {
    fn aktiv_entfernen(&mut self, call: &Call) {
        for p in [&call.initiator_id, &call.receiver_id] {
            if self.aktiv.get(p) == Some(&call.id) {
                self.aktiv.remove(p);
            }
        }
    }

    fn call_mut(&mut self, call_id: &CallId) -> Result<&mut Call> {
        self.calls
            .get_mut(call_id)
            .ok_or_else(|| CoordinatorError::nicht_gefunden(format!("Call {call_id}")))
    }

    fn ablehnen(&mut self, call_id: &CallId, jetzt: DateTime<Utc>) -> Result<Call> {
        let call = self.call_mut(call_id)?;
        if call.status != CallStatus::Pending {
            return Err(call.uebergang_fehler("reject"));
        }
        call.status = CallStatus::Rejected;
        call.ended_at = Some(jetzt);
        let call = call.clone();
        self.aktiv_entfernen(&call);

        tracing::info!(call_id = %call_id, "Call abgelehnt");
        Ok(call)
    }

    fn beenden(&mut self, call_id: &CallId, jetzt: DateTime<Utc>) -> Result<Call> {
        let call = self.call_mut(call_id)?;
        if call.status != CallStatus::Ongoing {
            return Err(call.uebergang_fehler("end"));
        }
        call.status = CallStatus::Completed;
        call.ended_at = Some(jetzt);
        call.duration_seconds = Some(dauer_sekunden(call.started_at, jetzt));
        let call = call.clone();
        self.aktiv_entfernen(&call);

        tracing::info!(
            call_id = %call_id,
            dauer_sek = call.duration_seconds.unwrap_or_default(),
            "Call beendet"
        );
        Ok(call)
    }
}

impl CallRegistry {
    /// Erstellt eine leere Registry mit der Systemuhr
    pub fn neu() -> Self {
        Self::mit_uhr(Arc::new(Utc::now))
    }

    /// Erstellt eine leere Registry mit eigener Zeitquelle
    pub fn mit_uhr(uhr: Uhr) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CallTabelle::default())),
            uhr,
        }
    }

    fn jetzt(&self) -> DateTime<Utc> {
        (self.uhr)()
    }

    /// Legt einen neuen Call im Status `pending` an
    ///
    /// Schlaegt mit `Konflikt` fehl, wenn einer der beiden Teilnehmer bereits
    /// einen aktiven Call hat. In diesem Fall wird nichts angelegt.
    pub fn create(&self, initiator: &PrincipalId, receiver: &PrincipalId) -> Result<Call> {
        if initiator == receiver {
            return Err(CoordinatorError::konflikt(
                "Ein Call braucht zwei verschiedene Teilnehmer",
            ));
        }

        let jetzt = self.jetzt();
        let mut tabelle = self.inner.lock();

        if tabelle.aktiv.contains_key(initiator) {
            return Err(CoordinatorError::konflikt(format!(
                "{initiator} hat bereits einen aktiven Call"
            )));
        }
        if tabelle.aktiv.contains_key(receiver) {
            return Err(CoordinatorError::konflikt(format!(
                "{receiver} hat bereits einen aktiven Call"
            )));
        }

        let mut token = CallToken::new(call_token_generieren());
        while tabelle.nach_token.contains_key(&token) {
            token = CallToken::new(call_token_generieren());
        }

        let call = Call {
            id: CallId::new(),
            initiator_id: initiator.clone(),
            receiver_id: receiver.clone(),
            status: CallStatus::Pending,
            call_token: token,
            started_at: jetzt,
            ended_at: None,
            duration_seconds: None,
        };

        tabelle.aktiv.insert(initiator.clone(), call.id);
        tabelle.aktiv.insert(receiver.clone(), call.id);
        tabelle.nach_token.insert(call.call_token.clone(), call.id);
        tabelle.calls.insert(call.id, call.clone());

        tracing::info!(
            call_id = %call.id,
            initiator = %initiator,
            receiver = %receiver,
            "Call angelegt"
        );
        Ok(call)
    }

    /// `pending` -> `ongoing`, setzt `started_at` auf den Medienbeginn
    pub fn accept(&self, call_id: &CallId) -> Result<Call> {
        let jetzt = self.jetzt();
        let mut tabelle = self.inner.lock();
        let call = tabelle.call_mut(call_id)?;

        if call.status != CallStatus::Pending {
            return Err(call.uebergang_fehler("accept"));
        }
        call.status = CallStatus::Ongoing;
        call.started_at = jetzt;

        tracing::info!(call_id = %call_id, "Call angenommen");
        Ok(call.clone())
    }

    /// `pending` -> `rejected`
    pub fn reject(&self, call_id: &CallId) -> Result<Call> {
        let jetzt = self.jetzt();
        self.inner.lock().ablehnen(call_id, jetzt)
    }

    /// `ongoing` -> `completed`, berechnet die Dauer
    pub fn end(&self, call_id: &CallId) -> Result<Call> {
        let jetzt = self.jetzt();
        self.inner.lock().beenden(call_id, jetzt)
    }

    /// Legt auf: `pending` wird abgelehnt, `ongoing` beendet
    ///
    /// Status lesen und Uebergang geschehen unter derselben Sperre.
    /// Terminale Calls liefern `UngueltigerUebergang`.
    pub fn auflegen(&self, call_id: &CallId) -> Result<Call> {
        let jetzt = self.jetzt();
        let mut tabelle = self.inner.lock();
        let status = tabelle.call_mut(call_id)?.status;
        match status {
            CallStatus::Pending => tabelle.ablehnen(call_id, jetzt),
            _ => tabelle.beenden(call_id, jetzt),
        }
    }

    /// Beendet den aktiven Call eines getrennten Principals implizit
    ///
    /// `pending` wird zu `rejected`, `ongoing` zu `completed`. Gibt den
    /// terminierten Call zurueck, oder `None` wenn kein aktiver Call existierte.
    pub fn beenden_wegen_trennung(&self, principal: &PrincipalId) -> Option<Call> {
        let jetzt = self.jetzt();
        let mut tabelle = self.inner.lock();
        let call_id = *tabelle.aktiv.get(principal)?;
        let call = tabelle.calls.get_mut(&call_id)?;

        match call.status {
            CallStatus::Pending => {
                call.status = CallStatus::Rejected;
                call.ended_at = Some(jetzt);
            }
            CallStatus::Ongoing => {
                call.status = CallStatus::Completed;
                call.ended_at = Some(jetzt);
                call.duration_seconds = Some(dauer_sekunden(call.started_at, jetzt));
            }
            CallStatus::Rejected | CallStatus::Completed => {}
        }
        let call = call.clone();
        tabelle.aktiv_entfernen(&call);

        tracing::info!(
            call_id = %call.id,
            principal = %principal,
            status = %call.status,
            "Call wegen Verbindungsabbruch terminiert"
        );
        Some(call)
    }

    /// Gibt einen Call anhand seiner ID zurueck
    pub fn get(&self, call_id: &CallId) -> Option<Call> {
        self.inner.lock().calls.get(call_id).cloned()
    }

    /// Gibt einen Call anhand seines Tokens zurueck
    pub fn get_by_token(&self, token: &CallToken) -> Option<Call> {
        let tabelle = self.inner.lock();
        let id = tabelle.nach_token.get(token)?;
        tabelle.calls.get(id).cloned()
    }

    /// Der aktive Call (pending/ongoing) eines Principals
    pub fn active_call(&self, principal: &PrincipalId) -> Option<Call> {
        let tabelle = self.inner.lock();
        let id = tabelle.aktiv.get(principal)?;
        tabelle.calls.get(id).cloned()
    }

    /// Eingehender, noch nicht angenommener Call eines Principals
    pub fn pending_for(&self, receiver: &PrincipalId) -> Option<Call> {
        self.active_call(receiver)
            .filter(|c| c.status == CallStatus::Pending && &c.receiver_id == receiver)
    }

    /// Verlauf eines Principals, neueste zuerst
    pub fn history(&self, principal: &PrincipalId, limit: usize) -> Vec<Call> {
        let tabelle = self.inner.lock();
        let mut calls: Vec<Call> = tabelle
            .calls
            .values()
            .filter(|c| c.ist_teilnehmer(principal))
            .cloned()
            .collect();
        calls.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        calls.truncate(limit);
        calls
    }

    /// Anzahl der Calls mit Status `pending` oder `ongoing`
    pub fn anzahl_aktiv(&self) -> usize {
        self.inner
            .lock()
            .calls
            .values()
            .filter(|c| c.status.ist_aktiv())
            .count()
    }

    /// Gesamtzahl gespeicherter Calls (inkl. Verlauf)
    pub fn anzahl(&self) -> usize {
        self.inner.lock().calls.len()
    }

    /// Begrenzt den Verlauf auf die `behalten` neuesten terminalen Calls je Principal
    ///
    /// Ein terminaler Call bleibt erhalten, solange er fuer mindestens einen
    /// seiner Teilnehmer unter den `behalten` neuesten liegt. Aktive Calls
    /// werden nie angefasst. Gibt die Anzahl entfernter Calls zurueck.
    pub fn prune_history(&self, behalten: usize) -> usize {
        let mut tabelle = self.inner.lock();

        let mut je_principal: HashMap<&PrincipalId, Vec<(DateTime<Utc>, CallId)>> =
            HashMap::new();
        for call in tabelle.calls.values().filter(|c| c.status.ist_terminal()) {
            for p in [&call.initiator_id, &call.receiver_id] {
                je_principal
                    .entry(p)
                    .or_default()
                    .push((call.verlauf_zeitpunkt(), call.id));
            }
        }

        let mut bleiben: HashSet<CallId> = HashSet::new();
        for liste in je_principal.values_mut() {
            liste.sort_by(|a, b| b.0.cmp(&a.0));
            bleiben.extend(liste.iter().take(behalten).map(|(_, id)| *id));
        }

        let entfernen: Vec<CallId> = tabelle
            .calls
            .values()
            .filter(|c| c.status.ist_terminal() && !bleiben.contains(&c.id))
            .map(|c| c.id)
            .collect();

        for id in &entfernen {
            if let Some(call) = tabelle.calls.remove(id) {
                tabelle.nach_token.remove(&call.call_token);
            }
        }

        if !entfernen.is_empty() {
            tracing::debug!(anzahl = entfernen.len(), "Call-Verlauf gekuerzt");
        }
        entfernen.len()
    }
}

impl Default for CallRegistry {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn p(id: &str) -> PrincipalId {
        PrincipalId::new(id)
    }

    #[test]
    fn auflegen_sieht_gleichzeitiges_annehmen() {
        // Die Uhr nimmt den Call an, bevor `auflegen` den Status liest
        let ziel: Arc<std::sync::OnceLock<(CallRegistry, CallId)>> = Arc::default();
        let scharf = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let uhr: Uhr = {
            let ziel = Arc::clone(&ziel);
            let scharf = Arc::clone(&scharf);
            Arc::new(move || {
                if scharf.swap(false, Ordering::SeqCst) {
                    if let Some((reg, id)) = ziel.get() {
                        reg.accept(id).unwrap();
                    }
                }
                Utc::now()
            })
        };
        let reg = CallRegistry::mit_uhr(uhr);
        let call = reg.create(&p("U1"), &p("U2")).unwrap();
        let _ = ziel.set((reg.clone(), call.id));

        scharf.store(true, Ordering::SeqCst);
        let beendet = reg.auflegen(&call.id).unwrap();
        assert_eq!(beendet.status, CallStatus::Completed);
        assert!(reg.active_call(&p("U1")).is_none());
    }

    /// Registry mit steuerbarer Uhr (Sekunden seit Epoch)
    fn registry_mit_uhr() -> (CallRegistry, Arc<AtomicI64>) {
        let sekunden = Arc::new(AtomicI64::new(1_700_000_000));
        let quelle = Arc::clone(&sekunden);
        let uhr: Uhr = Arc::new(move || {
            DateTime::<Utc>::from_timestamp(quelle.load(Ordering::SeqCst), 0).unwrap_or_default()
        });
        (CallRegistry::mit_uhr(uhr), sekunden)
    }

    #[test]
    fn create_setzt_pending_und_token() {
        let reg = CallRegistry::neu();
        let call = reg.create(&p("U1"), &p("U2")).unwrap();

        assert_eq!(call.status, CallStatus::Pending);
        assert!(call.call_token.as_str().len() >= 43);
        assert!(call.ended_at.is_none());
        assert!(call.duration_seconds.is_none());
        assert_eq!(reg.get_by_token(&call.call_token).unwrap().id, call.id);
    }

    #[test]
    fn tokens_sind_eindeutig() {
        let reg = CallRegistry::neu();
        let a = reg.create(&p("A"), &p("B")).unwrap();
        let b = reg.create(&p("C"), &p("D")).unwrap();
        assert_ne!(a.call_token, b.call_token);
    }

    #[test]
    fn zweiter_aktiver_call_ist_konflikt() {
        let reg = CallRegistry::neu();
        let call = reg.create(&p("U1"), &p("U2")).unwrap();
        reg.accept(&call.id).unwrap();

        let err = reg.create(&p("U1"), &p("U3")).unwrap_err();
        assert!(matches!(err, CoordinatorError::Konflikt(_)));
        // Auch der Empfaenger ist belegt
        let err = reg.create(&p("U3"), &p("U2")).unwrap_err();
        assert!(matches!(err, CoordinatorError::Konflikt(_)));
        assert_eq!(reg.anzahl(), 1, "Es darf kein neuer Call entstehen");
    }

    #[test]
    fn selbstanruf_ist_konflikt() {
        let reg = CallRegistry::neu();
        assert!(reg.create(&p("U1"), &p("U1")).is_err());
    }

    #[test]
    fn accept_setzt_startzeit_neu() {
        let (reg, uhr) = registry_mit_uhr();
        let call = reg.create(&p("U1"), &p("U2")).unwrap();
        uhr.fetch_add(15, Ordering::SeqCst);

        let angenommen = reg.accept(&call.id).unwrap();
        assert_eq!(angenommen.status, CallStatus::Ongoing);
        assert_eq!((angenommen.started_at - call.started_at).num_seconds(), 15);
    }

    #[test]
    fn end_berechnet_dauer() {
        let (reg, uhr) = registry_mit_uhr();
        let call = reg.create(&p("U1"), &p("U2")).unwrap();
        reg.accept(&call.id).unwrap();
        uhr.fetch_add(90, Ordering::SeqCst);

        let beendet = reg.end(&call.id).unwrap();
        assert_eq!(beendet.status, CallStatus::Completed);
        assert_eq!(beendet.duration_seconds, Some(90));
        let ende = beendet.ended_at.unwrap();
        assert_eq!((ende - beendet.started_at).num_seconds(), 90);
        assert!(reg.active_call(&p("U1")).is_none());
    }

    #[test]
    fn reject_setzt_endzeit_und_gibt_principals_frei() {
        let reg = CallRegistry::neu();
        let call = reg.create(&p("U1"), &p("U2")).unwrap();
        let abgelehnt = reg.reject(&call.id).unwrap();

        assert_eq!(abgelehnt.status, CallStatus::Rejected);
        assert!(abgelehnt.ended_at.is_some());
        assert!(abgelehnt.duration_seconds.is_none());
        assert!(reg.create(&p("U1"), &p("U2")).is_ok());
    }

    #[test]
    fn unzulaessige_uebergaenge_aendern_nichts() {
        let reg = CallRegistry::neu();
        let call = reg.create(&p("U1"), &p("U2")).unwrap();

        // pending -> completed ist verboten
        let err = reg.end(&call.id).unwrap_err();
        assert!(matches!(err, CoordinatorError::UngueltigerUebergang { aktion: "end", .. }));
        assert_eq!(reg.get(&call.id).unwrap(), call);

        reg.accept(&call.id).unwrap();
        assert!(reg.accept(&call.id).is_err());
        assert!(reg.reject(&call.id).is_err());

        let beendet = reg.end(&call.id).unwrap();
        for ergebnis in [reg.accept(&call.id), reg.reject(&call.id), reg.end(&call.id)] {
            assert!(matches!(
                ergebnis,
                Err(CoordinatorError::UngueltigerUebergang { .. })
            ));
        }
        assert_eq!(reg.get(&call.id).unwrap(), beendet);
    }

    #[test]
    fn unbekannter_call_ist_nicht_gefunden() {
        let reg = CallRegistry::neu();
        let err = reg.accept(&CallId::new()).unwrap_err();
        assert!(matches!(err, CoordinatorError::NichtGefunden(_)));
    }

    #[test]
    fn auflegen_je_nach_status() {
        let reg = CallRegistry::neu();
        let a = reg.create(&p("U1"), &p("U2")).unwrap();
        assert_eq!(reg.auflegen(&a.id).unwrap().status, CallStatus::Rejected);

        let b = reg.create(&p("U1"), &p("U2")).unwrap();
        reg.accept(&b.id).unwrap();
        assert_eq!(reg.auflegen(&b.id).unwrap().status, CallStatus::Completed);
        assert!(reg.auflegen(&b.id).is_err());
    }

    #[test]
    fn trennung_terminiert_aktiven_call() {
        let reg = CallRegistry::neu();
        let pending = reg.create(&p("U1"), &p("U2")).unwrap();
        let t = reg.beenden_wegen_trennung(&p("U2")).unwrap();
        assert_eq!(t.id, pending.id);
        assert_eq!(t.status, CallStatus::Rejected);

        let laufend = reg.create(&p("U1"), &p("U2")).unwrap();
        reg.accept(&laufend.id).unwrap();
        let t = reg.beenden_wegen_trennung(&p("U1")).unwrap();
        assert_eq!(t.status, CallStatus::Completed);
        assert!(t.ended_at.is_some());
        assert!(t.duration_seconds.unwrap() >= 0);

        assert!(reg.beenden_wegen_trennung(&p("U1")).is_none());
        assert_eq!(reg.anzahl_aktiv(), 0);
    }

    #[test]
    fn pending_nur_fuer_empfaenger() {
        let reg = CallRegistry::neu();
        let call = reg.create(&p("U1"), &p("U2")).unwrap();
        assert_eq!(reg.pending_for(&p("U2")).unwrap().id, call.id);
        assert!(reg.pending_for(&p("U1")).is_none());
    }

    #[test]
    fn verlauf_neueste_zuerst_und_begrenzt() {
        let (reg, uhr) = registry_mit_uhr();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let c = reg.create(&p("U1"), &p("U2")).unwrap();
            reg.reject(&c.id).unwrap();
            ids.push(c.id);
            uhr.fetch_add(10, Ordering::SeqCst);
        }

        let verlauf = reg.history(&p("U1"), 2);
        assert_eq!(verlauf.len(), 2);
        assert_eq!(verlauf[0].id, ids[2]);
        assert_eq!(verlauf[1].id, ids[1]);
        assert!(reg.history(&p("U9"), 10).is_empty());
    }

    #[test]
    fn prune_behaelt_neueste_und_aktive() {
        let (reg, uhr) = registry_mit_uhr();
        for _ in 0..4 {
            let c = reg.create(&p("U1"), &p("U2")).unwrap();
            reg.reject(&c.id).unwrap();
            uhr.fetch_add(10, Ordering::SeqCst);
        }
        let aktiv = reg.create(&p("U1"), &p("U2")).unwrap();

        let entfernt = reg.prune_history(2);
        assert_eq!(entfernt, 2);
        assert_eq!(reg.anzahl(), 3);
        assert!(reg.get(&aktiv.id).is_some());
    }

    #[test]
    fn prune_behaelt_call_wenn_fuer_einen_teilnehmer_neu() {
        let (reg, uhr) = registry_mit_uhr();
        // U3 hat nur diesen einen Call, U1 hat danach zwei neuere
        let alt = reg.create(&p("U1"), &p("U3")).unwrap();
        reg.reject(&alt.id).unwrap();
        for _ in 0..2 {
            uhr.fetch_add(10, Ordering::SeqCst);
            let c = reg.create(&p("U1"), &p("U2")).unwrap();
            reg.reject(&c.id).unwrap();
        }

        reg.prune_history(1);
        assert!(reg.get(&alt.id).is_some(), "Fuer U3 ist der Call der neueste");
    }

    #[test]
    fn status_serialisierung() {
        assert_eq!(
            serde_json::to_string(&CallStatus::Ongoing).unwrap(),
            "\"ongoing\""
        );
    }
}
