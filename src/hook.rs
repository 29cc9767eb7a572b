//! Slot-based function routing.
//!
//! Kernel extensions reach most of their imports and virtual methods through pointer slots
//! (GOT entries, vtable entries). Swapping the pointer in such a slot redirects every future
//! call, and the pointer that was there before stays a perfectly good way to call the
//! original, so no code needs to be rewritten or relocated.

use alloc::vec::Vec;

use core::sync::atomic::AtomicUsize;
use core::sync::atomic::Ordering::SeqCst;

use log::debug;

use crate::error::{Error, Result};
use crate::host::{LoadedModule, RouteRequest, RouteService, SymbolSolver};

/// Address of the slot holding the function pointer we will replace.
/// E.g. if `0x13371337` is the function we want to hook and `0x13381338` holds the value
/// `0x13371337`, then the `SlotAddress` is `0x13381338`.
pub type SlotAddress = usize;

/// Address of the function that will handle the hook.
pub type HookHandlerAddress = usize;

/// A hook installed by swapping the pointer held in a slot.
struct PointerHook {
    slot: SlotAddress,
    original_address: usize,
    new_address: HookHandlerAddress,
}

impl PointerHook {
    /// Swap `new_address` into the slot, remembering what was there.
    ///
    /// Safety: `slot` must be a valid, aligned, writable `usize` for as long as the hook
    /// lives.
    unsafe fn hook(slot: SlotAddress, new_address: HookHandlerAddress) -> Self {
        let atomic_slot = AtomicUsize::from_ptr(slot as *mut usize);
        let original_address = atomic_slot.swap(new_address, SeqCst);
        Self {
            slot,
            original_address,
            new_address,
        }
    }

    /// Put the original pointer back. Returns an error if the slot no longer holds our
    /// handler (someone else hooked over us).
    fn unhook(&self) -> Result<()> {
        // Safety: the slot was valid when hooked and must outlive the hook.
        let atomic_slot = unsafe { AtomicUsize::from_ptr(self.slot as *mut usize) };
        atomic_slot
            .compare_exchange(self.new_address, self.original_address, SeqCst, SeqCst)
            .map_err(|_| Error::RoutedSlotOverwritten(self.slot))
            .map(|_| ())
    }
}

/// Manages slot hooks and serves as a [`RouteService`] for runtimes that resolve symbols to
/// their dispatch slots.
pub struct Interceptor<S> {
    slot_solver: S,
    pointer_hooks: Vec<PointerHook>,
}

impl<S: SymbolSolver> Interceptor<S> {
    /// Safety: every address `slot_solver` returns must satisfy the requirements of
    /// [`Interceptor::hook`].
    pub unsafe fn new(slot_solver: S) -> Self {
        Self {
            slot_solver,
            pointer_hooks: Vec::new(),
        }
    }

    /// Redirect the slot to `handler`, returning the original pointer.
    ///
    /// Safety: `slot` must be a valid, aligned, writable `usize` for as long as the hook
    /// lives.
    pub unsafe fn hook(&mut self, slot: SlotAddress, handler: HookHandlerAddress) -> Result<usize> {
        if self.pointer_hooks.iter().any(|h| h.slot == slot) {
            return Err(Error::SlotAlreadyRouted(slot));
        }
        let hook = PointerHook::hook(slot, handler);
        let original = hook.original_address;
        self.pointer_hooks.push(hook);
        Ok(original)
    }

    /// Restore a slot and forget its hook.
    pub fn unhook(&mut self, slot: SlotAddress) -> Result<()> {
        let index = self
            .pointer_hooks
            .iter()
            .position(|h| h.slot == slot)
            .ok_or(Error::SlotNotRouted)?;
        self.pointer_hooks[index].unhook()?;
        self.pointer_hooks.remove(index);
        Ok(())
    }

    pub fn is_hooked(&self, slot: SlotAddress) -> bool {
        self.pointer_hooks.iter().any(|h| h.slot == slot)
    }
}

impl<S: SymbolSolver> RouteService for Interceptor<S> {
    fn route(&mut self, module: &LoadedModule, request: &RouteRequest) -> Result<usize> {
        let slot = self
            .slot_solver
            .solve_symbol(module, request.symbol)
            .ok_or(Error::MissingSymbol(request.symbol))?;
        // Safety: guaranteed by the contract of `Interceptor::new`.
        let original = unsafe { self.hook(slot, request.replacement)? };
        debug!(target: "nred", "Routed {} at slot {:#x} (original {:#x})", request.symbol, slot, original);
        Ok(original)
    }

    fn unroute(&mut self, module: &LoadedModule, request: &RouteRequest) -> Result<()> {
        let slot = self
            .slot_solver
            .solve_symbol(module, request.symbol)
            .ok_or(Error::MissingSymbol(request.symbol))?;
        self.unhook(slot)
    }
}
