//! Compiler configuration
//!
//! Every flag is named and its effect fixed; see the matching lowering
//! sites for where each one branches.

/// Configuration for one compilation.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Emit the `.rtti` string field and the synthesized `.instanceof()`
    /// method on classes.
    pub enable_rtti: bool,
    /// Give every non-constructor method a virtual slot.
    pub all_methods_virtual: bool,
    /// Package object-method captures as bound functions instead of
    /// trampolines.
    pub use_bound_function_for_objects: bool,
    /// Honor `async` / `await` / `for-await`.
    pub enable_async: bool,
    /// Emit the GC attribute on closure-bearing functions.
    pub enable_gc: bool,
    /// Select the Windows RTTI helper for try/throw.
    pub win_exception: bool,
    /// Treat `module { ... }` declarations as namespaces.
    pub module_as_namespace: bool,
    /// Never emit trampolines; always bind.
    pub replace_trampoline_with_bound_function: bool,
    /// Use 64-bit floating point for `number`; otherwise 32-bit.
    pub number_is_f64: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            enable_rtti: true,
            all_methods_virtual: false,
            use_bound_function_for_objects: false,
            enable_async: false,
            enable_gc: false,
            win_exception: false,
            module_as_namespace: true,
            replace_trampoline_with_bound_function: false,
            number_is_f64: true,
        }
    }
}

impl CompilerOptions {
    /// True when object-method captures should produce a bound function
    /// rather than a trampoline.
    pub fn bind_object_methods(&self) -> bool {
        self.use_bound_function_for_objects || self.replace_trampoline_with_bound_function
    }
}
