//! This module contains the hook pipeline: the [`Hook`] trait implemented by
//! observers of the interpreter, the ordered [`Hooks`] chain, and the
//! [`HookRegistry`] that reconstructs hooks from their persisted form.

pub mod breakpoint;
pub mod low_level;
pub mod param_tracer;

use std::{collections::HashMap, fmt::Debug};

use downcast_rs::{impl_downcast, Downcast};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    disassembly::Line,
    error::{execution, persistence},
    vm::Context,
};

/// An observer of the interpreter.
///
/// Hooks are invoked around every executed instruction: all [`Hook::pre_run`]
/// callbacks fire before the opcode executes and all [`Hook::post_run`]
/// callbacks after, in attach order in both phases.
///
/// Returning an error from `pre_run` aborts the step (except on the first
/// step of a [`Context::run`] call); this is how breakpoints pause execution.
/// Errors from `post_run` always abort.
///
/// Hooks observe the context immutably. They may carry arbitrary state of
/// their own, which is serialized under the hook's type tag when the context
/// is persisted.
pub trait Hook
where
    Self: Debug + Downcast,
{
    /// The type tag under which this hook serializes. Must match a name
    /// registered in the [`HookRegistry`] used at load time.
    fn type_name(&self) -> &'static str;

    /// Called before executing the current line. Return an error to stop
    /// running.
    ///
    /// # Errors
    ///
    /// Implementation specific; a breakpoint returns
    /// [`execution::Error::Breakpoint`].
    fn pre_run(&mut self, _ctx: &Context, _line: &Line) -> execution::Result<()> {
        Ok(())
    }

    /// Called after executing the current line. Return an error to stop
    /// running.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn post_run(&mut self, _ctx: &Context, _line: &Line) -> execution::Result<()> {
        Ok(())
    }

    /// Serializes the hook's state for persistence.
    ///
    /// # Errors
    ///
    /// If the state cannot be represented as JSON.
    fn to_value(&self) -> persistence::Result<serde_json::Value>;
}

impl_downcast!(Hook);

/// One hook entry in the persisted form of a context.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PersistedHook {
    /// The registered type tag of the hook.
    #[serde(rename = "Type")]
    pub type_name: String,

    /// The hook's own serialized state.
    #[serde(rename = "Value")]
    pub value: serde_json::Value,
}

/// The ordered chain of hooks attached to a context.
///
/// # Error Policy
///
/// Both phases run *every* hook regardless of intermediate errors, and the
/// *last* error wins: a later hook's error overwrites an earlier one. This
/// is deliberate: a tracer must keep observing even while a breakpoint hook
/// is reporting a hit, or its state would fall behind the machine's.
#[derive(Debug, Default)]
pub struct Hooks {
    list: Vec<Box<dyn Hook>>,
}

impl Hooks {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `hook` to the chain.
    pub fn attach(&mut self, hook: Box<dyn Hook>) {
        self.list.push(hook);
    }

    /// Removes and returns the hook at `index`, if it exists.
    pub fn detach(&mut self, index: usize) -> Option<Box<dyn Hook>> {
        if index < self.list.len() {
            Some(self.list.remove(index))
        } else {
            None
        }
    }

    /// Views the attached hooks in attach order.
    #[must_use]
    pub fn list(&self) -> &[Box<dyn Hook>] {
        &self.list
    }

    /// Gets the number of attached hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Checks whether any hooks are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Mutable access to the hook at `index`, for downcasting to a concrete
    /// hook type.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Box<dyn Hook>> {
        self.list.get_mut(index)
    }

    /// Runs the pre-instruction phase of every hook, in attach order,
    /// returning the last error produced.
    ///
    /// # Errors
    ///
    /// The error of the last hook that failed, if any did.
    pub fn pre_run_all(&mut self, ctx: &Context, line: &Line) -> execution::Result<()> {
        let mut result = Ok(());
        for hook in &mut self.list {
            if let Err(error) = hook.pre_run(ctx, line) {
                result = Err(error);
            }
        }
        result
    }

    /// Runs the post-instruction phase of every hook, in attach order,
    /// returning the last error produced.
    ///
    /// # Errors
    ///
    /// The error of the last hook that failed, if any did.
    pub fn post_run_all(&mut self, ctx: &Context, line: &Line) -> execution::Result<()> {
        let mut result = Ok(());
        for hook in &mut self.list {
            if let Err(error) = hook.post_run(ctx, line) {
                result = Err(error);
            }
        }
        result
    }

    /// Serializes the chain as `[{Type, Value}, ...]` entries.
    ///
    /// # Errors
    ///
    /// If any hook fails to serialize its state.
    pub fn to_persisted(&self) -> persistence::Result<Vec<PersistedHook>> {
        self.list
            .iter()
            .map(|hook| {
                Ok(PersistedHook {
                    type_name: hook.type_name().to_string(),
                    value: hook.to_value()?,
                })
            })
            .collect()
    }

    /// Reconstructs a chain from its persisted entries, in order, using the
    /// constructors registered in `registry`.
    ///
    /// # Errors
    ///
    /// If an entry names an unregistered type tag or its value fails to
    /// deserialize.
    pub fn from_persisted(
        entries: Vec<PersistedHook>,
        registry: &HookRegistry,
    ) -> persistence::Result<Self> {
        let mut hooks = Self::new();
        for entry in entries {
            hooks.attach(registry.construct(&entry.type_name, entry.value)?);
        }
        Ok(hooks)
    }
}

/// The constructor signature for reconstructing a hook from its serialized
/// state.
pub type HookConstructor = fn(serde_json::Value) -> persistence::Result<Box<dyn Hook>>;

/// A registry mapping hook type tags to constructors, used when loading a
/// persisted context.
///
/// The registry is an explicit handle rather than process-global state;
/// register custom hooks on it before passing it to
/// [`Context::load`](crate::vm::Context::load).
#[derive(Debug)]
pub struct HookRegistry {
    constructors: HashMap<&'static str, HookConstructor>,
}

impl HookRegistry {
    /// Creates a registry with no registered types.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registers `constructor` under `name`, replacing any previous
    /// registration of that name.
    pub fn register(&mut self, name: &'static str, constructor: HookConstructor) {
        self.constructors.insert(name, constructor);
    }

    /// Constructs the hook registered under `tag` from its serialized
    /// `value`.
    ///
    /// # Errors
    ///
    /// If `tag` is not registered or `value` does not deserialize.
    pub fn construct(
        &self,
        tag: &str,
        value: serde_json::Value,
    ) -> persistence::Result<Box<dyn Hook>> {
        let constructor =
            self.constructors
                .get(tag)
                .ok_or_else(|| persistence::Error::UnknownHookType {
                    tag: tag.to_string(),
                })?;
        constructor(value)
    }
}

/// Deserializes a hook of concrete type `H` from its serialized state.
///
/// # Errors
///
/// If the value does not deserialize into `H`.
pub fn deserialize_hook<H>(value: serde_json::Value) -> persistence::Result<Box<dyn Hook>>
where
    H: Hook + DeserializeOwned,
{
    Ok(Box::new(serde_json::from_value::<H>(value)?))
}

/// The default registry knows every built-in serializable hook.
impl Default for HookRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("BpPc", deserialize_hook::<breakpoint::BpPc>);
        registry.register("BpOpCode", deserialize_hook::<breakpoint::BpOpCode>);
        registry.register("ParamTracer", deserialize_hook::<param_tracer::ParamTracer>);
        registry.register("LowLevelTracer", deserialize_hook::<low_level::LowLevelTracer>);
        registry.register("OpLog", deserialize_hook::<low_level::OpLog>);
        registry
    }
}

#[cfg(test)]
mod test {
    use serde::{Deserialize, Serialize};

    use super::{deserialize_hook, Hook, HookRegistry, Hooks};
    use crate::{
        disassembly::Line,
        error::{execution, persistence},
        vm::Context,
    };

    /// A hook that records the order it was called in against a shared log.
    #[derive(Debug, Deserialize, Serialize)]
    struct Recording {
        name: String,
        #[serde(skip)]
        calls: Vec<&'static str>,
        fail_with: Option<String>,
    }

    impl Recording {
        fn new(name: &str, fail_with: Option<&str>) -> Self {
            Self {
                name: name.into(),
                calls: vec![],
                fail_with: fail_with.map(Into::into),
            }
        }
    }

    impl Hook for Recording {
        fn type_name(&self) -> &'static str {
            "Recording"
        }

        fn pre_run(&mut self, _ctx: &Context, _line: &Line) -> execution::Result<()> {
            self.calls.push("pre");
            match &self.fail_with {
                Some(reason) => Err(execution::Error::Breakpoint {
                    reason: reason.clone(),
                }),
                None => Ok(()),
            }
        }

        fn post_run(&mut self, _ctx: &Context, _line: &Line) -> execution::Result<()> {
            self.calls.push("post");
            Ok(())
        }

        fn to_value(&self) -> persistence::Result<serde_json::Value> {
            Ok(serde_json::to_value(self)?)
        }
    }

    fn any_line(ctx: &Context) -> std::rc::Rc<Line> {
        ctx.line().expect("the test context has code")
    }

    #[test]
    fn every_hook_runs_and_the_last_error_wins() -> anyhow::Result<()> {
        let ctx = Context::sample();
        let line = any_line(&ctx);

        let mut hooks = Hooks::new();
        hooks.attach(Box::new(Recording::new("a", Some("first"))));
        hooks.attach(Box::new(Recording::new("b", None)));
        hooks.attach(Box::new(Recording::new("c", Some("last"))));

        let result = hooks.pre_run_all(&ctx, &line);
        // The error from hook "c" overwrites the one from hook "a".
        match result {
            Err(execution::Error::Breakpoint { reason }) => assert_eq!(reason, "last"),
            other => panic!("expected the last breakpoint error, got {other:?}"),
        }

        // Hook "b" ran even though hook "a" had already errored.
        for index in 0..3 {
            let hook = hooks.get_mut(index).unwrap();
            let recording = hook.downcast_ref::<Recording>().unwrap();
            assert_eq!(recording.calls, vec!["pre"]);
        }
        Ok(())
    }

    #[test]
    fn detach_preserves_the_order_of_the_rest() {
        let mut hooks = Hooks::new();
        hooks.attach(Box::new(Recording::new("a", None)));
        hooks.attach(Box::new(Recording::new("b", None)));
        hooks.attach(Box::new(Recording::new("c", None)));

        let detached = hooks.detach(1).unwrap();
        assert_eq!(
            detached.downcast_ref::<Recording>().unwrap().name,
            "b"
        );
        assert_eq!(hooks.len(), 2);
        assert_eq!(
            hooks.list()[1].downcast_ref::<Recording>().unwrap().name,
            "c"
        );
    }

    #[test]
    fn unknown_type_tags_fail_to_load() {
        let registry = HookRegistry::default();
        let result = registry.construct("NoSuchHook", serde_json::Value::Null);
        assert!(matches!(
            result,
            Err(persistence::Error::UnknownHookType { tag }) if tag == "NoSuchHook"
        ));
    }

    #[test]
    fn custom_hooks_can_be_registered_and_reconstructed() -> anyhow::Result<()> {
        let mut registry = HookRegistry::default();
        registry.register("Recording", deserialize_hook::<Recording>);

        let value = serde_json::json!({ "name": "restored", "fail_with": null });
        let hook = registry.construct("Recording", value)?;
        assert_eq!(
            hook.downcast_ref::<Recording>().unwrap().name,
            "restored"
        );
        Ok(())
    }
}
