//! Engine slot manager - two-slot arena with an atomic online index
//!
//! The online and offline engines live in a fixed two-slot arena; the
//! audio path derives the online slot from a single atomic state word
//! and the commit swap is a compare-and-swap flip of its index bit. A
//! second bit in the same word marks an offline preparation in
//! progress: while it is set, the swap refuses to flip, so the worker
//! can never find the slot topology changing under its feet.

use crate::engine::{ConvolutionEngine, EngineError, EngineParam, ParamKey};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Bit 0 of the state word: index of the online slot
const INDEX: usize = 0b01;
/// Bit 1 of the state word: an offline preparation is in progress
const PREPARING: usize = 0b10;

pub struct EngineSlots<E> {
    slots: [Mutex<Option<E>>; 2],
    state: AtomicUsize,
}

impl<E: ConvolutionEngine> Default for EngineSlots<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ConvolutionEngine> EngineSlots<E> {
    pub fn new() -> Self {
        Self {
            slots: [Mutex::new(None), Mutex::new(None)],
            state: AtomicUsize::new(0),
        }
    }

    fn online_index(&self) -> usize {
        self.state.load(Ordering::Acquire) & INDEX
    }

    /// Run `f` against the online engine. The slot index is fetched
    /// once; `None` means no commit has happened yet and the caller
    /// must emit silence.
    pub fn with_online<R>(&self, f: impl FnOnce(Option<&mut E>) -> R) -> R {
        let mut slot = self.slots[self.online_index()].lock();
        f(slot.as_mut())
    }

    /// Look up a configuration value on the online engine.
    pub fn query_online(&self, key: ParamKey) -> Option<String> {
        self.with_online(|engine| engine.and_then(|e| e.query(key)))
    }

    /// Whether the offline slot currently holds an engine.
    pub fn has_offline(&self) -> bool {
        let index = (self.state.load(Ordering::Acquire) & INDEX) ^ 1;
        self.slots[index].lock().is_some()
    }

    /// Pin the slot topology for an offline preparation pass. All
    /// offline mutation goes through the returned guard; while it is
    /// live, [`EngineSlots::try_swap`] fails and the indices are
    /// stable.
    pub fn begin_prepare(&self) -> PrepareGuard<'_, E> {
        let prev = self.state.fetch_or(PREPARING, Ordering::AcqRel);
        debug_assert_eq!(prev & PREPARING, 0, "nested offline preparation");
        PrepareGuard {
            slots: self,
            offline: (prev & INDEX) ^ 1,
        }
    }

    /// Exchange the online and offline slots. O(1): one
    /// compare-and-swap of the index bit, so no intermediate state is
    /// ever visible to the audio path. Fails, with no side effect,
    /// while an offline preparation is in progress; the caller retries
    /// on a later block.
    pub fn try_swap(&self) -> bool {
        let state = self.state.load(Ordering::Acquire);
        if state & PREPARING != 0 {
            return false;
        }
        self.state
            .compare_exchange(state, state ^ INDEX, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Exclusive handle for mutating the offline slot
pub struct PrepareGuard<'a, E: ConvolutionEngine> {
    slots: &'a EngineSlots<E>,
    offline: usize,
}

impl<E: ConvolutionEngine> PrepareGuard<'_, E> {
    /// Allocate the offline engine if the slot is empty and seed it
    /// with the online configuration snapshot. Idempotent: requests
    /// arriving within one pending cycle accumulate into the same
    /// offline engine.
    pub fn ensure_offline_with(
        &self,
        alloc: impl FnOnce() -> Result<E, EngineError>,
    ) -> Result<(), EngineError> {
        let mut offline = self.slots.slots[self.offline].lock();
        if offline.is_some() {
            return Ok(());
        }
        let mut engine = alloc()?;
        let snapshot = self.slots.slots[self.offline ^ 1]
            .lock()
            .as_ref()
            .map(E::snapshot);
        if let Some(config) = snapshot {
            engine.restore(config);
        }
        *offline = Some(engine);
        Ok(())
    }

    /// Mutate a parameter on the offline engine only.
    pub fn configure(&self, param: EngineParam) -> Result<(), EngineError> {
        match self.slots.slots[self.offline].lock().as_mut() {
            Some(engine) => engine.set_param(param),
            None => Err(EngineError::NoOfflineEngine),
        }
    }

    /// Initialize the offline engine. On failure the engine stays
    /// allocated but uninitialized; the next cycle overwrites it.
    pub fn initialize(
        &self,
        sample_rate: u32,
        channels_in: usize,
        channels_out: usize,
        block_size: usize,
    ) -> Result<(), EngineError> {
        match self.slots.slots[self.offline].lock().as_mut() {
            Some(engine) => engine.initialize(sample_rate, channels_in, channels_out, block_size),
            None => Err(EngineError::NoOfflineEngine),
        }
    }
}

impl<E: ConvolutionEngine> Drop for PrepareGuard<'_, E> {
    fn drop(&mut self) {
        self.slots.state.fetch_and(!PREPARING, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use std::path::PathBuf;

    #[derive(Default)]
    struct TestEngine {
        config: EngineConfig,
        initialized: Option<(u32, usize, usize, usize)>,
    }

    impl ConvolutionEngine for TestEngine {
        fn snapshot(&self) -> EngineConfig {
            self.config.clone()
        }

        fn restore(&mut self, config: EngineConfig) {
            self.config = config;
        }

        fn set_param(&mut self, param: EngineParam) -> Result<(), EngineError> {
            match param {
                EngineParam::IrFile(path) => self.config.ir_file = Some(path),
                EngineParam::Gain(gain) => self.config.gain = gain,
            }
            Ok(())
        }

        fn initialize(
            &mut self,
            sample_rate: u32,
            channels_in: usize,
            channels_out: usize,
            block_size: usize,
        ) -> Result<(), EngineError> {
            self.initialized = Some((sample_rate, channels_in, channels_out, block_size));
            Ok(())
        }

        fn process(&mut self, _inputs: &[&[f32]], _outputs: &mut [&mut [f32]], _n_samples: usize) {}

        fn query(&self, key: ParamKey) -> Option<String> {
            match key {
                ParamKey::IrFile => self
                    .config
                    .ir_file
                    .as_ref()
                    .map(|p| p.display().to_string()),
                ParamKey::Gain => Some(self.config.gain.to_string()),
            }
        }
    }

    fn alloc() -> Result<TestEngine, EngineError> {
        Ok(TestEngine::default())
    }

    #[test]
    fn test_online_starts_empty() {
        let slots = EngineSlots::<TestEngine>::new();
        assert!(slots.with_online(|e| e.is_none()));
        assert_eq!(slots.query_online(ParamKey::IrFile), None);
    }

    #[test]
    fn test_ensure_offline_is_idempotent() {
        let slots = EngineSlots::<TestEngine>::new();
        let prep = slots.begin_prepare();
        let mut allocations = 0;
        for _ in 0..3 {
            prep.ensure_offline_with(|| {
                allocations += 1;
                alloc()
            })
            .unwrap();
        }
        assert_eq!(allocations, 1);
        drop(prep);
        assert!(slots.has_offline());
    }

    #[test]
    fn test_configure_mutates_offline_only() {
        let slots = EngineSlots::<TestEngine>::new();

        // put an engine online first
        {
            let prep = slots.begin_prepare();
            prep.ensure_offline_with(alloc).unwrap();
        }
        assert!(slots.try_swap());

        let prep = slots.begin_prepare();
        prep.ensure_offline_with(alloc).unwrap();
        prep.configure(EngineParam::IrFile(PathBuf::from("/ir/plate.wav")))
            .unwrap();
        drop(prep);

        assert_eq!(slots.query_online(ParamKey::IrFile), None);
        assert!(slots.try_swap());
        assert_eq!(
            slots.query_online(ParamKey::IrFile),
            Some("/ir/plate.wav".to_string())
        );
    }

    #[test]
    fn test_snapshot_fidelity_across_partial_change() {
        let slots = EngineSlots::<TestEngine>::new();

        // online engine with a non-default gain
        {
            let prep = slots.begin_prepare();
            prep.ensure_offline_with(alloc).unwrap();
            prep.configure(EngineParam::Gain(0.25)).unwrap();
            prep.configure(EngineParam::IrFile(PathBuf::from("/ir/old.wav")))
                .unwrap();
        }
        assert!(slots.try_swap());

        // change only the impulse response
        {
            let prep = slots.begin_prepare();
            prep.ensure_offline_with(alloc).unwrap();
            prep.configure(EngineParam::IrFile(PathBuf::from("/ir/new.wav")))
                .unwrap();
            prep.initialize(48_000, 1, 1, 1024).unwrap();
        }
        assert!(slots.try_swap());

        assert_eq!(
            slots.query_online(ParamKey::IrFile),
            Some("/ir/new.wav".to_string())
        );
        assert_eq!(slots.query_online(ParamKey::Gain), Some("0.25".to_string()));
    }

    #[test]
    fn test_swap_refused_while_preparing() {
        let slots = EngineSlots::<TestEngine>::new();
        let prep = slots.begin_prepare();
        prep.ensure_offline_with(alloc).unwrap();
        assert!(!slots.try_swap());
        drop(prep);
        assert!(slots.try_swap());
    }

    #[test]
    fn test_configure_without_offline_fails() {
        let slots = EngineSlots::<TestEngine>::new();
        let prep = slots.begin_prepare();
        assert!(matches!(
            prep.configure(EngineParam::Gain(0.5)),
            Err(EngineError::NoOfflineEngine)
        ));
    }

    #[test]
    fn test_displaced_engine_stays_for_reuse() {
        let slots = EngineSlots::<TestEngine>::new();
        {
            let prep = slots.begin_prepare();
            prep.ensure_offline_with(alloc).unwrap();
        }
        assert!(slots.try_swap());
        // first cycle had no displaced engine; offline is empty again
        assert!(!slots.has_offline());

        {
            let prep = slots.begin_prepare();
            prep.ensure_offline_with(alloc).unwrap();
        }
        assert!(slots.try_swap());
        // the displaced first engine now sits in the offline slot
        assert!(slots.has_offline());
    }
}
