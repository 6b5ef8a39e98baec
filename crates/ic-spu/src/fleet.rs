//! The six-unit SPU fleet

use tracing::debug;

use crate::unit::SpuUnit;

/// Number of SPUs on the Cell
pub const SPU_COUNT: usize = 6;

/// Owns the six SPU units and coordinates their stepping.
///
/// Units touch only their own local store, so the parallel mode needs no
/// cross-unit synchronization: each worker gets exclusive access to one
/// unit for the duration of the call, and all workers are joined before
/// the call returns.
pub struct SpuFleet {
    units: [SpuUnit; SPU_COUNT],
}

impl SpuFleet {
    pub fn new() -> Self {
        debug!(target: "spu", "initializing {} SPU cores", SPU_COUNT);
        Self {
            units: std::array::from_fn(|i| SpuUnit::new(i as u32)),
        }
    }

    pub fn unit(&self, index: usize) -> &SpuUnit {
        &self.units[index]
    }

    pub fn unit_mut(&mut self, index: usize) -> &mut SpuUnit {
        &mut self.units[index]
    }

    pub fn units(&self) -> &[SpuUnit; SPU_COUNT] {
        &self.units
    }

    /// Advance each non-halted unit by up to `budget` instructions,
    /// in unit order on the caller's thread.
    pub fn execute_all(&mut self, budget: u32) {
        for unit in self.units.iter_mut() {
            if !unit.is_halted() {
                unit.execute_block(budget);
            }
        }
    }

    /// Advance each non-halted unit on its own thread; joins all workers
    /// before returning, so the caller blocks for the slowest unit.
    /// Inter-unit ordering within the call is unspecified.
    pub fn execute_all_parallel(&mut self, budget: u32) {
        std::thread::scope(|scope| {
            for unit in self.units.iter_mut() {
                if !unit.is_halted() {
                    scope.spawn(move || {
                        unit.execute_block(budget);
                    });
                }
            }
        });
    }

    /// Reset every unit to power-on state
    pub fn reset_all(&mut self) {
        for unit in self.units.iter_mut() {
            unit.reset();
        }
    }

    /// Serialize per-unit state for debugging
    pub fn dump_all_registers(&self) -> String {
        let mut out = String::new();
        for unit in &self.units {
            out.push_str(&unit.dump_registers());
            out.push('\n');
        }
        out
    }
}

impl Default for SpuFleet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// il rt, imm
    fn il(rt: u32, imm: u32) -> u32 {
        (0x20 << 24) | (rt << 19) | (imm & 0xFFFF)
    }

    /// a rt, ra, rb
    fn a(rt: u32, ra: u32, rb: u32) -> u32 {
        (0x08 << 24) | (rt << 19) | (ra << 14) | (rb << 9)
    }

    fn load_counting_program(fleet: &mut SpuFleet) {
        // Every unit runs: il r1, <id+1>; il r2, 10; a r3, r1, r2
        for i in 0..SPU_COUNT {
            let unit = fleet.unit_mut(i);
            let program = [il(1, i as u32 + 1), il(2, 10), a(3, 1, 2)];
            for (j, word) in program.iter().enumerate() {
                unit.ls_write_u32(j as u32 * 4, *word);
            }
            unit.set_pc(0);
        }
    }

    #[test]
    fn test_fleet_creation() {
        let fleet = SpuFleet::new();
        for i in 0..SPU_COUNT {
            assert_eq!(fleet.unit(i).id, i as u32);
            assert!(!fleet.unit(i).is_halted());
        }
    }

    #[test]
    fn test_sequential_execution() {
        let mut fleet = SpuFleet::new();
        load_counting_program(&mut fleet);

        fleet.execute_all(3);
        for i in 0..SPU_COUNT {
            // il puts the immediates in the preferred word; the 64-bit
            // lane add keeps the sum there.
            assert_eq!(fleet.unit(i).reg(3), [i as u32 + 11, 0, 0, 0]);
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut sequential = SpuFleet::new();
        let mut parallel = SpuFleet::new();
        load_counting_program(&mut sequential);
        load_counting_program(&mut parallel);

        sequential.execute_all(3);
        parallel.execute_all_parallel(3);

        for i in 0..SPU_COUNT {
            assert_eq!(
                sequential.unit(i).reg(3),
                parallel.unit(i).reg(3),
                "unit {} diverged between stepping modes",
                i
            );
            assert_eq!(sequential.unit(i).pc(), parallel.unit(i).pc());
        }
    }

    #[test]
    fn test_halted_unit_skipped() {
        let mut fleet = SpuFleet::new();
        load_counting_program(&mut fleet);
        // Unit 0 halts on an unknown opcode; the rest keep going.
        fleet.unit_mut(0).ls_write_u32(0, 0xFF00_0000);

        fleet.execute_all(3);
        assert!(fleet.unit(0).is_halted());
        assert_eq!(fleet.unit(1).reg(3), [12, 0, 0, 0]);

        // A second pass skips the halted unit without disturbing it.
        let pc_before = fleet.unit(0).pc();
        fleet.execute_all(3);
        assert_eq!(fleet.unit(0).pc(), pc_before);
    }

    #[test]
    fn test_reset_all() {
        let mut fleet = SpuFleet::new();
        load_counting_program(&mut fleet);
        fleet.execute_all(3);

        fleet.reset_all();
        for i in 0..SPU_COUNT {
            assert_eq!(fleet.unit(i).reg(3), [0; 4]);
            assert_eq!(fleet.unit(i).pc(), 0);
        }
    }

    #[test]
    fn test_dump_all_registers() {
        let fleet = SpuFleet::new();
        let dump = fleet.dump_all_registers();
        for i in 0..SPU_COUNT {
            assert!(dump.contains(&format!("SPU{}", i)));
        }
    }
}
