//! Planification des chunks de réponse sur la timeline de sortie
//!
//! Les chunks arrivent du réseau par à-coups. Pour une lecture continue,
//! chaque chunk démarre exactement à la fin du précédent, sauf si
//! l'horloge du périphérique a déjà dépassé ce point (trou réseau) :
//! il démarre alors immédiatement.
//!
//! ```text
//! start = max(next_playback_time, now)
//! next_playback_time = start + durée
//! ```
//!
//! Une interruption (l'utilisateur parle par-dessus l'assistant) arrête
//! toutes les unités en cours et remet `next_playback_time` à zéro.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::{AudioChunk, AudioResult, PlaybackDevice, PlaybackUnit, UnitId};

/// Planificateur de lecture, propriétaire du périphérique de sortie
pub struct PlaybackScheduler {
    device: Box<dyn PlaybackDevice>,

    /// Instant où le prochain chunk doit démarrer (secondes, horloge du périphérique)
    next_playback_time: f64,

    /// Unités planifiées qui n'ont ni terminé ni été arrêtées
    active: BTreeMap<UnitId, PlaybackUnit>,

    next_unit_id: u64,
    closed: bool,
}

impl PlaybackScheduler {
    pub fn new(device: Box<dyn PlaybackDevice>) -> Self {
        Self {
            device,
            next_playback_time: 0.0,
            active: BTreeMap::new(),
            next_unit_id: 0,
            closed: false,
        }
    }

    /// Planifie un chunk à la suite des précédents
    ///
    /// # Returns
    /// - `Ok(Some(unit))` : l'unité créée
    /// - `Ok(None)` : chunk de durée nulle, ou planificateur déjà fermé ; rien n'a bougé
    ///
    /// # Erreurs
    /// Erreur du périphérique ; la timeline n'est alors pas avancée.
    pub fn schedule(&mut self, chunk: &AudioChunk) -> AudioResult<Option<PlaybackUnit>> {
        if self.closed {
            debug!(sequence = chunk.sequence_number, "Chunk reçu après fermeture, ignoré");
            return Ok(None);
        }
        if chunk.duration() <= 0.0 {
            debug!(sequence = chunk.sequence_number, "Chunk de durée nulle, aucune unité créée");
            return Ok(None);
        }

        let now = self.device.current_time();
        let start = self.next_playback_time.max(now);
        let unit = PlaybackUnit {
            id: UnitId(self.next_unit_id),
            sequence_number: chunk.sequence_number,
            start,
            duration: chunk.duration(),
        };

        self.device.schedule(&unit, chunk)?;

        self.next_unit_id += 1;
        self.next_playback_time = unit.end();
        self.active.insert(unit.id, unit);

        debug!(
            unit = %unit.id,
            sequence = unit.sequence_number,
            start = unit.start,
            duration = unit.duration,
            late = now > unit.start,
            "Chunk planifié"
        );
        Ok(Some(unit))
    }

    /// Retire une unité arrivée au bout de sa lecture
    ///
    /// Retourne `false` si l'unité n'était plus suivie (déjà arrêtée).
    pub fn on_unit_completed(&mut self, id: UnitId) -> bool {
        self.active.remove(&id).is_some()
    }

    /// Arrête toute la lecture en cours (barge-in)
    ///
    /// Retourne le nombre d'unités arrêtées.
    pub fn interrupt(&mut self) -> usize {
        let stopped = self.active.len();
        for id in self.active.keys() {
            self.device.stop_unit(*id);
        }
        self.active.clear();
        self.next_playback_time = 0.0;
        stopped
    }

    /// Arrête tout et ferme le périphérique ; idempotent
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.interrupt();
        if let Err(e) = self.device.close() {
            warn!(error = %e, "Fermeture de la sortie audio en erreur");
        }
        self.closed = true;
    }

    pub fn next_playback_time(&self) -> f64 {
        self.next_playback_time
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Unités actives, dans l'ordre de planification
    pub fn active_units(&self) -> impl Iterator<Item = &PlaybackUnit> + '_ {
        self.active.values()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Accès en lecture au périphérique (horloge, tap de sortie)
    pub fn device(&self) -> &dyn PlaybackDevice {
        self.device.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AudioError, VirtualPlayback, VirtualPlaybackProbe};
    use tokio::sync::mpsc;

    fn scheduler() -> (PlaybackScheduler, VirtualPlaybackProbe, mpsc::UnboundedReceiver<UnitId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (device, probe) = VirtualPlayback::new(256, tx);
        (PlaybackScheduler::new(Box::new(device)), probe, rx)
    }

    fn chunk(samples: usize, sequence: u64) -> AudioChunk {
        AudioChunk::new(vec![0.1; samples], 24000, sequence)
    }

    #[test]
    fn test_back_to_back_scheduling() {
        let (mut scheduler, probe, _rx) = scheduler();
        probe.set_time(0.0);

        // 0.5s, 0.5s, 0.25s arrivés à t=0
        let a = scheduler.schedule(&chunk(12000, 1)).unwrap().unwrap();
        let b = scheduler.schedule(&chunk(12000, 2)).unwrap().unwrap();
        let c = scheduler.schedule(&chunk(6000, 3)).unwrap().unwrap();

        assert_eq!((a.start, b.start, c.start), (0.0, 0.5, 1.0));
        assert!((scheduler.next_playback_time() - 1.25).abs() < 1e-12);
        assert!(!a.overlaps(&b) && !b.overlaps(&c));
    }

    #[test]
    fn test_late_chunk_starts_now() {
        let (mut scheduler, probe, _rx) = scheduler();
        probe.set_time(0.0);
        scheduler.schedule(&chunk(12000, 1)).unwrap();

        // Trou réseau : l'horloge a dépassé la fin de la première unité
        probe.set_time(2.0);
        let late = scheduler.schedule(&chunk(2400, 2)).unwrap().unwrap();
        assert_eq!(late.start, 2.0);
        assert!((scheduler.next_playback_time() - 2.1).abs() < 1e-12);
    }

    #[test]
    fn test_empty_chunk_is_ignored() {
        let (mut scheduler, probe, _rx) = scheduler();
        probe.set_time(0.3);
        scheduler.schedule(&chunk(2400, 1)).unwrap();
        let before = scheduler.next_playback_time();

        assert!(scheduler.schedule(&chunk(0, 2)).unwrap().is_none());
        assert_eq!(scheduler.next_playback_time(), before);
        assert_eq!(scheduler.active_count(), 1);
        assert_eq!(probe.scheduled().len(), 1);
    }

    #[test]
    fn test_zero_rate_chunk_is_ignored() {
        let (mut scheduler, probe, _rx) = scheduler();
        probe.set_time(0.2);

        let silent_rate = AudioChunk::new(vec![0.1; 480], 0, 1);
        assert!(scheduler.schedule(&silent_rate).unwrap().is_none());
        assert_eq!(scheduler.next_playback_time(), 0.0);
        assert_eq!(scheduler.active_count(), 0);
        assert!(probe.scheduled().is_empty());
    }

    #[test]
    fn test_timeline_never_moves_backwards() {
        let (mut scheduler, probe, _rx) = scheduler();
        let mut last = scheduler.next_playback_time();
        for (i, now) in [0.0, 0.05, 0.02, 0.4, 0.41, 0.9].iter().enumerate() {
            probe.set_time(*now);
            let unit = scheduler.schedule(&chunk(1200, i as u64)).unwrap().unwrap();
            assert!(unit.start >= *now);
            assert!(scheduler.next_playback_time() >= last);
            last = scheduler.next_playback_time();
        }

        let units: Vec<_> = scheduler.active_units().copied().collect();
        for (i, a) in units.iter().enumerate() {
            for b in &units[i + 1..] {
                assert!(!a.overlaps(b));
            }
        }
    }

    #[test]
    fn test_completion_removes_unit() {
        let (mut scheduler, probe, mut rx) = scheduler();
        let unit = scheduler.schedule(&chunk(2400, 1)).unwrap().unwrap();

        assert!(probe.complete(unit.id));
        let completed = rx.try_recv().unwrap();
        assert!(scheduler.on_unit_completed(completed));
        assert_eq!(scheduler.active_count(), 0);
        assert!(!scheduler.on_unit_completed(completed));
    }

    #[test]
    fn test_interrupt_stops_everything() {
        let (mut scheduler, probe, _rx) = scheduler();
        probe.set_time(1.0);
        for i in 0..3 {
            scheduler.schedule(&chunk(4800, i)).unwrap();
        }

        assert_eq!(scheduler.interrupt(), 3);
        assert_eq!(scheduler.active_count(), 0);
        assert_eq!(scheduler.next_playback_time(), 0.0);
        assert_eq!(probe.stopped().len(), 3);
        assert_eq!(probe.active_count(), 0);

        // Après interruption, le chunk suivant démarre à l'horloge courante
        let next = scheduler.schedule(&chunk(2400, 9)).unwrap().unwrap();
        assert_eq!(next.start, 1.0);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let (mut scheduler, probe, _rx) = scheduler();
        scheduler.schedule(&chunk(2400, 1)).unwrap();

        scheduler.shutdown();
        scheduler.shutdown();
        assert!(scheduler.is_closed());
        assert!(probe.is_closed());
        assert_eq!(scheduler.active_count(), 0);
        assert!(scheduler.schedule(&chunk(2400, 2)).unwrap().is_none());
    }

    #[test]
    fn test_device_error_does_not_advance_timeline() {
        let (mut scheduler, probe, _rx) = scheduler();
        scheduler.schedule(&chunk(2400, 1)).unwrap();
        let before = scheduler.next_playback_time();

        // Le périphérique refuse une fois fermé de l'extérieur
        scheduler.device.close().unwrap();
        assert!(matches!(scheduler.schedule(&chunk(2400, 2)), Err(AudioError::DeviceDisconnected)));
        assert_eq!(scheduler.next_playback_time(), before);
        assert!(probe.is_closed());
    }
}
