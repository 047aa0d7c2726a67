//! Integration-Tests fuer CallRegistry und MatchQueue im Zusammenspiel

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use unilink_calls::{CallRegistry, CallStatus, MatchErgebnis, MatchQueue, QueueEntry};
use unilink_core::{CoordinatorError, PrincipalId};

fn p(id: &str) -> PrincipalId {
    PrincipalId::new(id)
}

fn eintrag(id: &str) -> QueueEntry {
    QueueEntry::neu(p(id), None)
}

#[test]
fn match_aus_queue_erzeugt_pending_call() {
    let queue = MatchQueue::neu();
    let calls = CallRegistry::neu();

    // U2 wartet bereits, U1 tritt bei
    assert_eq!(queue.enqueue(eintrag("U2")), 1);
    assert_eq!(queue.enqueue(eintrag("U1")), 2);

    let partner = queue.try_match(&p("U1"), &HashSet::new()).unwrap();
    assert_eq!(partner.principal_id, p("U2"));
    assert_eq!(queue.size(), 0);

    let call = calls.create(&p("U1"), &partner.principal_id).unwrap();
    assert_eq!(call.status, CallStatus::Pending);
    assert_eq!(call.initiator_id, p("U1"));
    assert_eq!(call.receiver_id, p("U2"));
    assert_eq!(calls.get_by_token(&call.call_token).unwrap().id, call.id);
}

#[test]
fn kompletter_lebenszyklus() {
    let calls = CallRegistry::neu();
    let call = calls.create(&p("U1"), &p("U2")).unwrap();
    assert_eq!(calls.active_call(&p("U1")).unwrap().id, call.id);
    assert_eq!(calls.active_call(&p("U2")).unwrap().id, call.id);

    let laufend = calls.accept(&call.id).unwrap();
    assert_eq!(laufend.status, CallStatus::Ongoing);

    let beendet = calls.end(&call.id).unwrap();
    assert_eq!(beendet.status, CallStatus::Completed);
    assert!(beendet.duration_seconds.unwrap() >= 0);
    assert!(beendet.ended_at.unwrap() >= beendet.started_at);

    // Terminal: keine weiteren Uebergaenge
    assert!(matches!(
        calls.accept(&call.id),
        Err(CoordinatorError::UngueltigerUebergang { .. })
    ));
    assert_eq!(calls.history(&p("U2"), 20).len(), 1);
}

#[test]
fn gleichzeitige_creates_respektieren_einen_aktiven_call() {
    let calls = CallRegistry::neu();
    let erfolge: usize = (0..8)
        .map(|i| {
            let calls = calls.clone();
            thread::spawn(move || calls.create(&p("U1"), &p(&format!("X{i}"))).is_ok())
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap() as usize)
        .sum();

    assert_eq!(erfolge, 1, "U1 darf nur einen aktiven Call haben");
    assert_eq!(calls.anzahl_aktiv(), 1);
}

#[test]
fn gleichzeitige_joins_paaren_jeden_hoechstens_einmal() {
    let queue = MatchQueue::neu();
    let paare = Arc::new(sammler::Sammler::default());

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let queue = queue.clone();
            let paare = Arc::clone(&paare);
            thread::spawn(move || {
                let id = format!("P{i}");
                if let MatchErgebnis::Gefunden(partner) =
                    queue.match_or_enqueue(eintrag(&id), &HashSet::new())
                {
                    paare.hinzufuegen(id, partner.principal_id.as_str().to_string());
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let paare = paare.alle();
    let mut gesehen = HashSet::new();
    for (a, b) in &paare {
        assert!(gesehen.insert(a.clone()), "{a} doppelt gepaart");
        assert!(gesehen.insert(b.clone()), "{b} doppelt gepaart");
    }
    assert_eq!(gesehen.len() + queue.size(), 10);
}

/// Thread-sicherer Sammler fuer gefundene Paare
mod sammler {
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct Sammler(Mutex<Vec<(String, String)>>);

    impl Sammler {
        pub fn hinzufuegen(&self, a: String, b: String) {
            self.0.lock().unwrap().push((a, b));
        }

        pub fn alle(&self) -> Vec<(String, String)> {
            self.0.lock().unwrap().clone()
        }
    }
}
