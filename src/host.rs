//! Services the host plugin runtime provides to the patcher.
//!
//! The runtime discovers modules, tells us when one has been loaded and exposes symbol
//! resolution, function routing and a kernel-writable toggle. The patcher only talks to
//! it through the traits below.

use log::{debug, error, warn};

use crate::error::{Error, Result};

/// A module that has just been loaded and is still writable.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LoadedModule {
    /// Runtime-assigned load index.
    pub index: usize,
    /// Base address of the module's image.
    pub address: usize,
    /// Size of the module's image in bytes.
    pub size: usize,
}

impl LoadedModule {
    /// View the module image as a byte slice.
    ///
    /// # Safety
    /// `address..address + size` must be mapped, writable and not aliased for the lifetime
    /// of the returned slice.
    pub unsafe fn image_mut<'a>(&self) -> &'a mut [u8] {
        core::slice::from_raw_parts_mut(self.address as *mut u8, self.size)
    }
}

/// Maps symbol names inside a loaded module to addresses.
pub trait SymbolSolver {
    fn solve_symbol(&mut self, module: &LoadedModule, name: &str) -> Option<usize>;

    /// Resolve a batch of symbols. Either every address is returned or none is: the
    /// result array is only produced once the last symbol has been found.
    fn solve_multiple<const N: usize>(
        &mut self,
        module: &LoadedModule,
        names: &[&'static str; N],
    ) -> Result<[usize; N]> {
        let mut addresses = [0usize; N];
        for (slot, &name) in addresses.iter_mut().zip(names) {
            *slot = self.solve_symbol(module, name).ok_or_else(|| {
                error!(target: "nred", "Failed to resolve {}", name);
                Error::MissingSymbol(name)
            })?;
            debug!(target: "nred", "Resolved {} -> {:#x}", name, *slot);
        }
        Ok(addresses)
    }
}

/// A single interception: future calls to `symbol` land in `replacement`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RouteRequest {
    pub symbol: &'static str,
    pub replacement: usize,
}

impl RouteRequest {
    pub const fn new(symbol: &'static str, replacement: usize) -> Self {
        Self {
            symbol,
            replacement,
        }
    }
}

/// Replaces function entry points and hands back call-through handles.
pub trait RouteService {
    /// Install one route, returning the address that still behaves like the original.
    fn route(&mut self, module: &LoadedModule, request: &RouteRequest) -> Result<usize>;

    /// Remove a route installed by [`RouteService::route`].
    fn unroute(&mut self, module: &LoadedModule, request: &RouteRequest) -> Result<()>;

    /// Install a batch of routes. On the first failure every route the batch already
    /// installed is removed again, newest first, and the failure is returned.
    fn route_multiple<const N: usize>(
        &mut self,
        module: &LoadedModule,
        requests: &[RouteRequest; N],
    ) -> Result<[usize; N]> {
        let mut originals = [0usize; N];
        for (i, request) in requests.iter().enumerate() {
            match self.route(module, request) {
                Ok(original) => originals[i] = original,
                Err(e) => {
                    error!(target: "nred", "Failed to route {}: {}", request.symbol, e);
                    for installed in requests[..i].iter().rev() {
                        if let Err(e) = self.unroute(module, installed) {
                            warn!(target: "nred", "Failed to unroute {}: {}", installed.symbol, e);
                        }
                    }
                    return Err(Error::RouteFailed(request.symbol));
                }
            }
        }
        Ok(originals)
    }
}

/// The runtime's kernel-memory write-enable primitive.
pub trait KernelWriting {
    fn set_kernel_writing(&mut self, enable: bool) -> Result<()>;
}

/// Keeps kernel writing enabled while alive; disabling on drop is best effort.
pub struct KernelWriteGuard<'a, K: KernelWriting + ?Sized> {
    writer: &'a mut K,
}

impl<'a, K: KernelWriting + ?Sized> KernelWriteGuard<'a, K> {
    /// Enable kernel writing. If enabling fails nothing is held and nothing will be
    /// restored.
    pub fn acquire(writer: &'a mut K) -> Result<Self> {
        writer.set_kernel_writing(true)?;
        Ok(Self { writer })
    }
}

impl<K: KernelWriting + ?Sized> Drop for KernelWriteGuard<'_, K> {
    fn drop(&mut self) {
        if let Err(e) = self.writer.set_kernel_writing(false) {
            warn!(target: "nred", "Failed to disable kernel writing: {}", e);
        }
    }
}

/// Everything a load-time pipeline needs from the runtime.
pub trait KernelPatcher: SymbolSolver + RouteService + KernelWriting {}

impl<T: SymbolSolver + RouteService + KernelWriting> KernelPatcher for T {}

/// Key to bytes lookup for bundled firmware blobs.
pub trait FirmwareStore {
    fn firmware(&self, name: &str) -> Option<&'static [u8]>;
}

/// A fixed list of named blobs, usually generated at build time.
impl FirmwareStore for [(&'static str, &'static [u8])] {
    fn firmware(&self, name: &str) -> Option<&'static [u8]> {
        self.iter().find(|(n, _)| *n == name).map(|(_, data)| *data)
    }
}

impl<const N: usize> FirmwareStore for [(&'static str, &'static [u8]); N] {
    fn firmware(&self, name: &str) -> Option<&'static [u8]> {
        self.as_slice().firmware(name)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloc::collections::BTreeMap;
    use alloc::string::String;
    use alloc::vec;
    use alloc::vec::Vec;

    /// In-process runtime double: symbol names map to whatever addresses the test owns.
    #[derive(Default)]
    pub struct MockPatcher {
        pub symbols: BTreeMap<&'static str, usize>,
        pub originals: BTreeMap<&'static str, usize>,
        pub routed: Vec<RouteRequest>,
        pub unrouted: Vec<&'static str>,
        pub fail_route: Option<&'static str>,
        pub fail_enable_writing: bool,
        pub fail_disable_writing: bool,
        pub writing: bool,
        pub writing_log: Vec<bool>,
    }

    impl SymbolSolver for MockPatcher {
        fn solve_symbol(&mut self, _module: &LoadedModule, name: &str) -> Option<usize> {
            self.symbols.get(name).copied()
        }
    }

    impl RouteService for MockPatcher {
        fn route(&mut self, _module: &LoadedModule, request: &RouteRequest) -> Result<usize> {
            if self.fail_route == Some(request.symbol) {
                return Err(Error::RouteFailed(request.symbol));
            }
            self.routed.push(*request);
            Ok(self.originals.get(request.symbol).copied().unwrap_or(0x1000))
        }

        fn unroute(&mut self, _module: &LoadedModule, request: &RouteRequest) -> Result<()> {
            self.routed.retain(|r| r.symbol != request.symbol);
            self.unrouted.push(request.symbol);
            Ok(())
        }
    }

    impl KernelWriting for MockPatcher {
        fn set_kernel_writing(&mut self, enable: bool) -> Result<()> {
            self.writing_log.push(enable);
            if (enable && self.fail_enable_writing) || (!enable && self.fail_disable_writing) {
                return Err(Error::KernelWriting);
            }
            self.writing = enable;
            Ok(())
        }
    }

    pub const MODULE: LoadedModule = LoadedModule {
        index: 1,
        address: 0,
        size: 0,
    };

    #[test]
    fn solve_multiple_returns_all_addresses() {
        let mut patcher = MockPatcher::default();
        patcher.symbols.insert("_a", 0x10);
        patcher.symbols.insert("_b", 0x20);
        assert_eq!(patcher.solve_multiple(&MODULE, &["_a", "_b"]), Ok([0x10, 0x20]));
    }

    #[test]
    fn solve_multiple_fails_as_a_whole() {
        let mut patcher = MockPatcher::default();
        let names: Vec<String> = (0..18).map(|i| alloc::format!("_sym{i}")).collect();
        let names: Vec<&'static str> = names.into_iter().map(|n| &*n.leak()).collect();
        for &name in names.iter().filter(|n| **n != "_sym11") {
            patcher.symbols.insert(name, 0x1000);
        }
        let names: [&'static str; 18] = names.try_into().unwrap();
        assert_eq!(
            patcher.solve_multiple(&MODULE, &names),
            Err(Error::MissingSymbol("_sym11"))
        );
    }

    #[test]
    fn route_multiple_rolls_back_on_failure() {
        let mut patcher = MockPatcher {
            fail_route: Some("_c"),
            ..Default::default()
        };
        let requests = [
            RouteRequest::new("_a", 1),
            RouteRequest::new("_b", 2),
            RouteRequest::new("_c", 3),
        ];
        assert_eq!(
            patcher.route_multiple(&MODULE, &requests),
            Err(Error::RouteFailed("_c"))
        );
        assert!(patcher.routed.is_empty());
        assert_eq!(patcher.unrouted, vec!["_b", "_a"]);
    }

    #[test]
    fn route_multiple_returns_originals_in_order() {
        let mut patcher = MockPatcher::default();
        patcher.originals.insert("_a", 0xA0);
        patcher.originals.insert("_b", 0xB0);
        let requests = [RouteRequest::new("_a", 1), RouteRequest::new("_b", 2)];
        assert_eq!(patcher.route_multiple(&MODULE, &requests), Ok([0xA0, 0xB0]));
    }

    #[test]
    fn write_guard_restores_on_drop() {
        let mut patcher = MockPatcher::default();
        {
            let _guard = KernelWriteGuard::acquire(&mut patcher).unwrap();
        }
        assert_eq!(patcher.writing_log, vec![true, false]);
        assert!(!patcher.writing);
    }

    #[test]
    fn write_guard_failed_enable_restores_nothing() {
        let mut patcher = MockPatcher {
            fail_enable_writing: true,
            ..Default::default()
        };
        assert!(KernelWriteGuard::acquire(&mut patcher).is_err());
        assert_eq!(patcher.writing_log, vec![true]);
    }

    #[test]
    fn firmware_store_lookup() {
        static BLOBS: [(&str, &[u8]); 2] = [("a.bin", &[1, 2]), ("b.bin", &[3])];
        let store: &(dyn FirmwareStore + Sync) = &BLOBS;
        assert_eq!(store.firmware("b.bin"), Some(&[3u8][..]));
        assert_eq!(store.firmware("c.bin"), None);
    }
}
