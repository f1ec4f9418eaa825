/*++

Licensed under the Apache-2.0 license.

File Name:

    se.rs

Abstract:

    File contains the driver instance: the platform interface and the state
    that outlives a single operation.

--*/

use crate::drng::{Drng, DrngConfig};
use crate::engine::Engine;
use crate::SeResult;
use se_registers::{EngineId, SeHal};

/// Security Engine driver instance.
pub struct Se<H: SeHal> {
    hal: H,
    drng: Drng,
}

impl<H: SeHal> Se<H> {
    pub fn new(hal: H, drng: DrngConfig) -> Self {
        Self {
            hal,
            drng: Drng::new(drng),
        }
    }

    /// Take exclusive ownership of `id` until the guard drops.
    pub fn lock(&mut self, id: EngineId) -> SeResult<Engine<'_, H>> {
        Engine::lock(&mut self.hal, id)
    }

    /// Fill `out` from the hardware RNG.
    pub fn random(&mut self, out: &mut [u8]) -> SeResult<()> {
        self.drng.generate(&mut self.hal, out)
    }

    pub fn drng(&self) -> &Drng {
        &self.drng
    }

    pub fn flush_random_cache(&mut self) {
        self.drng.flush_cache();
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }
}
