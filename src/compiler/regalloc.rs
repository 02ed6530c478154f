//! Stack-discipline register allocator for one compilation frame.

use crate::bytecode::{MAX_REG, Reg};

/// Registers are handed out as a stack. Temporaries above `floor` (the
/// registers holding live variables) may only be freed from the top.
#[derive(Debug, Default)]
pub struct RegAlloc {
    next: usize,
    floor: usize,
    high_water: usize,
}

/// Allocator position captured by [`RegAlloc::mark`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark {
    next: usize,
    floor: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfRegisters;

impl RegAlloc {
    pub fn new() -> Self {
        RegAlloc::default()
    }

    /// Next register `reserve` would hand out.
    pub fn next(&self) -> usize {
        self.next
    }

    /// Highest register count reached so far.
    pub fn frame_size(&self) -> usize {
        self.high_water
    }

    /// Reserves `n` consecutive registers and returns the first.
    pub fn reserve(&mut self, n: usize) -> Result<Reg, OutOfRegisters> {
        let base = self.next;
        let end = base + n;
        if end > MAX_REG + 1 {
            return Err(OutOfRegisters);
        }
        self.next = end;
        self.high_water = self.high_water.max(end);
        Reg::try_from(base).map_err(|_| OutOfRegisters)
    }

    /// Makes sure the frame covers registers below `n` without reserving them.
    pub fn ensure_frame(&mut self, n: usize) -> Result<(), OutOfRegisters> {
        if n > MAX_REG + 1 {
            return Err(OutOfRegisters);
        }
        self.high_water = self.high_water.max(n);
        Ok(())
    }

    /// Releases a temporary register. Registers below the floor belong to
    /// variables and are left alone; anything else must be the top of the stack.
    pub fn free(&mut self, r: Reg) {
        let r = r as usize;
        if r < self.floor {
            return;
        }
        assert_eq!(r + 1, self.next, "register {r} freed out of order (next free is {})", self.next);
        self.next = r;
    }

    /// Rewinds so that `r` is the next register handed out.
    pub fn rewind_to(&mut self, r: usize) {
        assert!(r >= self.floor, "rewind to {r} would release variable registers (floor {})", self.floor);
        assert!(r <= self.next, "rewind to {r} past next free register {}", self.next);
        self.next = r;
    }

    /// Promotes every reserved register to a variable slot.
    pub fn pin(&mut self) {
        self.floor = self.next;
    }

    pub fn mark(&self) -> Mark {
        Mark { next: self.next, floor: self.floor }
    }

    /// Drops everything reserved since `mark`, variables included.
    pub fn release_to(&mut self, mark: Mark) {
        assert!(mark.next <= self.next, "release to a mark above the current top");
        self.next = mark.next;
        self.floor = mark.floor;
    }
}
