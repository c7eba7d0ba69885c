//! Event-driven execution engine
//!
//! The host enqueues events with [`Engine::send`] and drains them with
//! [`Engine::run_full_cycle`]. Nothing runs during `send`: subscriptions only
//! fan out further enqueues. Faults raised while processing one pending event
//! are reported and isolated to that event.

use crate::console::{Callbacks, Console, StdConsole};
use crate::expr::{as_condition, EvalContext};
use crate::pool::{index_from, PoolCommand};
use crate::{
    Action, EmitTarget, EngineConfig, EntityId, EntityTable, Error, Event, Expr, PendingEvent,
    Result, Value, ValueMap,
};
use indexmap::IndexMap;
use std::cell::Cell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use tracing::{debug, warn};

/// A registered `when` subscription
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    /// Entity that receives the handler event
    pub subscriber: EntityId,
    /// Event sent to the subscriber
    pub handler: String,
    /// Arguments evaluated against the subscriber at fire time; `None`
    /// forwards the triggering send's arguments
    pub args: Option<Vec<Expr>>,
}

/// A runtime fault isolated to one pending event
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub entity: String,
    pub event: String,
    pub error: Error,
}

/// Outcome of [`Engine::run_full_cycle`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Pending events taken off the queue
    pub processed: usize,
    /// Faults raised, in processing order
    pub faults: Vec<Fault>,
}

impl CycleReport {
    /// Check if every event ran without a fault
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

/// Outcome of [`Engine::garbage_collect`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entity references removed from pools, nested pools included
    pub pool_refs: usize,
    /// Subscriptions removed because their subscriber is gone
    pub subscriptions: usize,
}

/// Scoped hold on the synchronous-call flag, released on drop
struct SyncGuard {
    flag: Rc<Cell<bool>>,
}

impl SyncGuard {
    fn acquire(flag: &Rc<Cell<bool>>, entity: &str, event: &str) -> Result<Self> {
        if flag.get() {
            return Err(Error::NestedSyncCall {
                entity: entity.to_string(),
                event: event.to_string(),
            });
        }
        flag.set(true);
        Ok(Self {
            flag: Rc::clone(flag),
        })
    }
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// Execution state of one running event
struct Frame {
    entity: EntityId,
    event: String,
    scope: ValueMap,
    /// Last value assigned; the result of a synchronous call
    last: Value,
}

impl Frame {
    fn new(entity: EntityId, event: &str, scope: ValueMap) -> Self {
        Self {
            entity,
            event: event.to_string(),
            scope,
            last: Value::Null,
        }
    }
}

/// The execution engine
///
/// Owns the event queue, the subscription table, the synchronous-call guard,
/// host callbacks and the console. Every entry point takes `&mut self`, so
/// one engine serves one caller at a time.
pub struct Engine {
    queue: VecDeque<PendingEvent>,
    /// Count of queued events per (target, event), for the duplicate check
    queued: HashMap<(EntityId, String), usize>,
    /// (target name, event name) -> subscribers
    subscriptions: IndexMap<(String, String), Vec<Subscription>>,
    sync_active: Rc<Cell<bool>>,
    callbacks: Callbacks,
    console: Box<dyn Console>,
    config: EngineConfig,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Create an engine with the default config writing to the standard
    /// streams
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an engine with the given config
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            queue: VecDeque::new(),
            queued: HashMap::new(),
            subscriptions: IndexMap::new(),
            sync_active: Rc::new(Cell::new(false)),
            callbacks: Callbacks::new(),
            console: Box::new(StdConsole),
            config,
        }
    }

    /// Replace the console
    pub fn with_console(mut self, console: impl Console + 'static) -> Self {
        self.console = Box::new(console);
        self
    }

    /// Replace the console in place
    pub fn set_console(&mut self, console: impl Console + 'static) {
        self.console = Box::new(console);
    }

    /// The active config
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register a host callback reachable through the host emit builtin
    pub fn register_callback(
        &mut self,
        name: impl Into<String>,
        callback: impl FnMut(&[Value]) + 'static,
    ) {
        self.callbacks.register(name, callback);
    }

    /// Host callback registry
    pub fn callbacks_mut(&mut self) -> &mut Callbacks {
        &mut self.callbacks
    }

    /// Number of pending events
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Check if nothing is queued
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pending events in queue order
    pub fn pending(&self) -> impl Iterator<Item = &PendingEvent> {
        self.queue.iter()
    }

    /// Subscribers registered for `target.event`
    pub fn subscribers(&self, target: &str, event: &str) -> &[Subscription] {
        self.subscriptions
            .get(&(target.to_string(), event.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn is_queued(&self, pending: &PendingEvent) -> bool {
        self.queued.get(&pending.key()).is_some_and(|&n| n > 0)
            && self.queue.iter().any(|p| p.same_message(pending))
    }

    /// Enqueue an event unless an identical one is already pending, then fan
    /// out to subscribers of `target.event`
    ///
    /// Fails only if evaluating a subscription's handler arguments faults.
    pub fn send(
        &mut self,
        table: &EntityTable,
        target: EntityId,
        event: &str,
        args: Vec<Value>,
    ) -> Result<()> {
        let pending = PendingEvent::new(target, event).with_args(args);
        if self.is_queued(&pending) {
            debug!(entity = %target, event, "dropped duplicate pending event");
            return Ok(());
        }
        *self.queued.entry(pending.key()).or_insert(0) += 1;

        let Some(name) = table.get(target).map(|e| e.name.clone()) else {
            self.queue.push_back(pending);
            return Ok(());
        };
        let subscribers = self
            .subscriptions
            .get(&(name, event.to_string()))
            .cloned()
            .unwrap_or_default();
        let args = if subscribers.is_empty() {
            Vec::new()
        } else {
            pending.args.clone()
        };
        self.queue.push_back(pending);

        for sub in subscribers {
            let Some(subscriber) = table.get(sub.subscriber).filter(|e| !e.is_destroyed()) else {
                continue;
            };
            let handler_args = match &sub.args {
                Some(exprs) => {
                    let scope = ValueMap::new();
                    let ctx = EvalContext::new(subscriber, &scope, table).in_event(&sub.handler);
                    exprs.iter().map(|e| e.eval(&ctx)).collect::<Result<Vec<_>>>()?
                }
                None => args.clone(),
            };
            self.send(table, sub.subscriber, &sub.handler, handler_args)?;
        }
        Ok(())
    }

    /// Enqueue an event for a declared entity by name
    pub fn send_named(
        &mut self,
        table: &EntityTable,
        name: &str,
        event: &str,
        args: Vec<Value>,
    ) -> Result<()> {
        let id = table
            .id_of(name)
            .ok_or_else(|| Error::EntityNotFound(name.to_string()))?;
        self.send(table, id, event, args)
    }

    /// Drain the queue, including everything enqueued while draining
    pub fn run_full_cycle(&mut self, table: &mut EntityTable) -> CycleReport {
        let mut report = CycleReport::default();
        while let Some(pending) = self.queue.pop_front() {
            let key = pending.key();
            if let Some(n) = self.queued.get_mut(&key) {
                *n -= 1;
                if *n == 0 {
                    self.queued.remove(&key);
                }
            }

            report.processed += 1;
            if let Err(error) = self.process(table, &pending) {
                let entity = table
                    .get(pending.target)
                    .map(|e| e.name.clone())
                    .unwrap_or_else(|| pending.target.to_string());
                warn!(entity = %entity, event = %pending.event, error = %error, "event faulted");
                self.console.report(&format!(
                    "[Runtime Error] Entity '{}', event '{}': {}",
                    entity, pending.event, error
                ));
                report.faults.push(Fault {
                    entity,
                    event: pending.event,
                    error,
                });
            }
        }
        debug!(
            processed = report.processed,
            faults = report.faults.len(),
            "cycle complete"
        );
        report
    }

    fn process(&mut self, table: &mut EntityTable, pending: &PendingEvent) -> Result<()> {
        // unknown targets and events are silently ignored
        let Some(event) = table.get(pending.target).and_then(|e| e.event(&pending.event)) else {
            return Ok(());
        };
        let scope = self.bind(&event, &pending.args)?;
        let mut frame = Frame::new(pending.target, &event.name, scope);
        self.run_actions(table, &mut frame, &event.actions)
    }

    fn run_actions(
        &mut self,
        table: &mut EntityTable,
        frame: &mut Frame,
        actions: &[Action],
    ) -> Result<()> {
        for action in actions {
            if !self.execute(table, frame, action)? {
                break;
            }
        }
        Ok(())
    }

    fn bind(&self, event: &Event, args: &[Value]) -> Result<ValueMap> {
        let expected = event.params.len();
        if args.len() < expected || (self.config.strict_arity && args.len() != expected) {
            return Err(Error::ArgumentCount {
                event: event.name.clone(),
                expected,
                got: args.len(),
            });
        }
        Ok(event
            .params
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect())
    }

    /// Run an event immediately and return the last value it assigned
    ///
    /// Only one synchronous call may be active at a time; a synchronous call
    /// issued from inside another faults with [`Error::NestedSyncCall`].
    pub fn execute_sync(
        &mut self,
        table: &mut EntityTable,
        target: EntityId,
        event: &str,
        args: Vec<Value>,
    ) -> Result<Value> {
        let entity = table
            .get(target)
            .ok_or_else(|| Error::EntityNotFound(target.to_string()))?;
        let _guard = SyncGuard::acquire(&self.sync_active, &entity.name, event)?;
        let handler = entity.event(event).ok_or_else(|| Error::EventNotFound {
            entity: entity.name.clone(),
            event: event.to_string(),
        })?;

        let scope = self.bind(&handler, &args)?;
        let mut frame = Frame::new(target, event, scope);
        self.run_actions(table, &mut frame, &handler.actions)?;
        Ok(frame.last)
    }

    /// Execute one action; `Ok(false)` halts the rest of the event
    fn execute(&mut self, table: &mut EntityTable, frame: &mut Frame, action: &Action) -> Result<bool> {
        match action {
            Action::Set { value, target } => {
                let value = eval(table, frame, value)?;
                assign(table, frame, target, value.clone())?;
                frame.last = value;
                Ok(true)
            }

            Action::SetIndex { pool, index, value } => {
                let value = eval(table, frame, value)?;
                let index = index_from(&eval(table, frame, index)?, pool)?;
                assign_index(table, frame, pool, index, value.clone())?;
                frame.last = value;
                Ok(true)
            }

            Action::Check { condition, then } => {
                let passed = as_condition(&eval(table, frame, condition)?)?;
                match then {
                    Some(inner) if passed => self.execute(table, frame, inner),
                    Some(_) => Ok(true),
                    None => Ok(passed),
                }
            }

            Action::Block(actions) => {
                for inner in actions {
                    if !self.execute(table, frame, inner)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }

            Action::EmitWithReturn {
                target,
                event,
                args,
                field,
            } => {
                let args = eval_all(table, frame, args)?;
                let callee = sync_target(table, frame, target)?;
                let result = self.execute_sync(table, callee, event, args)?;
                assign(table, frame, field, result.clone())?;
                frame.last = result;
                Ok(true)
            }

            Action::EmitWithReturnIndexed {
                target,
                event,
                args,
                pool,
                index,
            } => {
                let args = eval_all(table, frame, args)?;
                let callee = sync_target(table, frame, target)?;
                let result = self.execute_sync(table, callee, event, args)?;
                let index = index_from(&eval(table, frame, index)?, pool)?;
                assign_index(table, frame, pool, index, result.clone())?;
                frame.last = result;
                Ok(true)
            }

            Action::Emit {
                target,
                event,
                args,
            } => {
                let args = if event == PoolCommand::Each.name() {
                    eval_each_args(table, frame, args)?
                } else {
                    eval_all(table, frame, args)?
                };
                if !self.builtin(table, frame, target, event, &args)? {
                    self.route(table, frame, target, event, args)?;
                }
                Ok(true)
            }

            Action::When {
                target,
                event,
                handler,
                args,
            } => {
                let result = self.subscribe(table, frame.entity, target, event, handler, args.clone());
                self.usage(result)?;
                Ok(true)
            }

            Action::Unwhen {
                target,
                event,
                handler,
            } => {
                let result = self.unsubscribe(table, frame.entity, target, event, handler);
                self.usage(result)?;
                Ok(true)
            }
        }
    }

    /// Report usage faults and swallow them; pass runtime faults through
    fn usage(&mut self, result: Result<()>) -> Result<()> {
        match result {
            Err(error) if error.is_usage_fault() => {
                warn!(error = %error, "subscription rejected");
                self.console.report(&format!("[Subscription Error] {}", error));
                Ok(())
            }
            other => other,
        }
    }

    /// Handle `log`, `input`, the host emit, and `self.destroy`
    fn builtin(
        &mut self,
        table: &mut EntityTable,
        frame: &mut Frame,
        target: &EmitTarget,
        event: &str,
        args: &[Value],
    ) -> Result<bool> {
        match target {
            EmitTarget::SelfRef if event == "destroy" => {
                if let Some(entity) = table.get_mut(frame.entity) {
                    entity.destroy();
                    debug!(entity = %entity.name, "entity destroyed");
                }
                Ok(true)
            }
            EmitTarget::Implicit if event == "log" => {
                let line = args
                    .iter()
                    .map(|v| log_text(v, table))
                    .collect::<Vec<_>>()
                    .join(" ");
                self.console.log(&line);
                Ok(true)
            }
            EmitTarget::Implicit if event == "input" => {
                let prompt = args.first().map(Value::to_string).unwrap_or_default();
                let line = self.console.read_line(&prompt);
                let field = args.get(1).map(Value::to_string).unwrap_or_default();
                if !field.is_empty() {
                    let value = match line {
                        Some(line) => match line.trim().parse::<f64>() {
                            Ok(n) => Value::Number(n),
                            Err(_) => Value::String(line),
                        },
                        None => Value::Null,
                    };
                    assign(table, frame, &field, value)?;
                }
                Ok(true)
            }
            EmitTarget::Implicit if event == self.config.host_emit => {
                if let Some((name, rest)) = args.split_first() {
                    let name = name.to_string();
                    if !self.callbacks.invoke(&name, rest) {
                        debug!(callback = %name, "no host callback registered");
                    }
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Deliver a non-builtin emit: queue an event or run a pool command
    fn route(
        &mut self,
        table: &mut EntityTable,
        frame: &Frame,
        target: &EmitTarget,
        event: &str,
        args: Vec<Value>,
    ) -> Result<()> {
        match target {
            EmitTarget::Implicit | EmitTarget::SelfRef => self.send(table, frame.entity, event, args),

            EmitTarget::Remote { entity, field } => {
                let owner = table
                    .id_of(entity)
                    .ok_or_else(|| Error::EntityNotFound(entity.clone()))?;
                let command = PoolCommand::parse(event).ok_or_else(|| Error::UnknownPoolCommand {
                    command: event.to_string(),
                    pool: target.describe(),
                })?;
                self.pool_command(table, owner, field, command, args)
            }

            EmitTarget::Named(name) => {
                let own_pool = table
                    .get(frame.entity)
                    .and_then(|e| e.get(name))
                    .is_some_and(|v| v.as_pool().is_some());
                if own_pool {
                    if let Some(command) = PoolCommand::parse(event) {
                        return self.pool_command(table, frame.entity, name, command, args);
                    }
                }
                let id = table
                    .id_of(name)
                    .ok_or_else(|| Error::EntityNotFound(name.clone()))?;
                self.send(table, id, event, args)
            }
        }
    }

    fn pool_command(
        &mut self,
        table: &mut EntityTable,
        owner: EntityId,
        field: &str,
        command: PoolCommand,
        args: Vec<Value>,
    ) -> Result<()> {
        match command {
            PoolCommand::Each => {
                let (event, rest) = match args.split_first() {
                    Some((event, rest)) if !event.is_null() => (event.to_string(), rest.to_vec()),
                    _ => {
                        return Err(Error::PoolCommand {
                            command: command.name().to_string(),
                            pool: field.to_string(),
                            reason: "requires an event name".to_string(),
                        })
                    }
                };
                let view: &EntityTable = table;
                let members: Vec<EntityId> = pool_ref(view, owner, field)?
                    .iter()
                    .filter_map(|v| view.resolve(v))
                    .collect();
                for member in members {
                    self.send(table, member, &event, rest.clone())?;
                }
                Ok(())
            }

            PoolCommand::Add => {
                let proto = match args.first() {
                    Some(Value::String(name)) => table.id_of(name),
                    _ => None,
                };
                let Some(proto) = proto else {
                    return pool_mut(table, owner, field)?.apply(field, command, &args);
                };
                // check the pool before spawning so a bad target leaves no orphan
                pool_mut(table, owner, field)?;
                let clone = table.spawn_clone(proto)?;
                pool_mut(table, owner, field)?.append(Value::Entity(clone));
                debug!(proto = %proto, clone = %clone, pool = field, "spawned pool member");
                let init = self.config.init_event.clone();
                self.send(table, clone, &init, Vec::new())
            }

            _ => pool_mut(table, owner, field)?.apply(field, command, &args),
        }
    }

    /// Register `subscriber` for `target.event`
    ///
    /// Self-subscription and unknown targets are usage faults; registering
    /// the same (subscriber, handler) pair twice is a no-op.
    pub fn subscribe(
        &mut self,
        table: &EntityTable,
        subscriber: EntityId,
        target: &str,
        event: &str,
        handler: &str,
        args: Option<Vec<Expr>>,
    ) -> Result<()> {
        let target_id = table
            .id_of(target)
            .ok_or_else(|| Error::UnknownSubscriptionTarget(target.to_string()))?;
        if target_id == subscriber {
            return Err(Error::SelfSubscription(target.to_string()));
        }

        let list = self
            .subscriptions
            .entry((target.to_string(), event.to_string()))
            .or_default();
        if !list
            .iter()
            .any(|s| s.subscriber == subscriber && s.handler == handler)
        {
            list.push(Subscription {
                subscriber,
                handler: handler.to_string(),
                args,
            });
            debug!(subscriber = %subscriber, source = target, event, handler, "subscribed");
        }
        Ok(())
    }

    /// Remove the (subscriber, handler) pair from `target.event`
    pub fn unsubscribe(
        &mut self,
        table: &EntityTable,
        subscriber: EntityId,
        target: &str,
        event: &str,
        handler: &str,
    ) -> Result<()> {
        if table.id_of(target).is_none() {
            return Err(Error::UnknownSubscriptionTarget(target.to_string()));
        }
        let key = (target.to_string(), event.to_string());
        if let Some(list) = self.subscriptions.get_mut(&key) {
            list.retain(|s| !(s.subscriber == subscriber && s.handler == handler));
            if list.is_empty() {
                self.subscriptions.shift_remove(&key);
            }
            debug!(subscriber = %subscriber, source = target, event, handler, "unsubscribed");
        }
        Ok(())
    }

    /// Remove references to destroyed (or discarded) entities from every pool
    /// and drop their subscriptions; the table itself is left untouched
    pub fn garbage_collect(&mut self, table: &mut EntityTable) -> SweepReport {
        let live: HashSet<EntityId> = table
            .iter()
            .filter(|e| !e.is_destroyed())
            .map(|e| e.id)
            .collect();
        let keep = |id: EntityId| live.contains(&id);

        let mut report = SweepReport::default();
        for entity in table.iter_mut() {
            for value in entity.fields.values_mut() {
                if let Value::Pool(pool) = value {
                    report.pool_refs += pool.retain_entities(&keep);
                }
            }
        }

        for list in self.subscriptions.values_mut() {
            let before = list.len();
            list.retain(|s| keep(s.subscriber));
            report.subscriptions += before - list.len();
        }
        self.subscriptions.retain(|_, list| !list.is_empty());

        if report != SweepReport::default() {
            debug!(
                pool_refs = report.pool_refs,
                subscriptions = report.subscriptions,
                "garbage collected"
            );
        }
        report
    }
}

fn eval(table: &EntityTable, frame: &Frame, expr: &Expr) -> Result<Value> {
    let entity = table
        .get(frame.entity)
        .ok_or_else(|| Error::EntityNotFound(frame.entity.to_string()))?;
    expr.eval(&EvalContext::new(entity, &frame.scope, table).in_event(&frame.event))
}

fn eval_all(table: &EntityTable, frame: &Frame, exprs: &[Expr]) -> Result<Vec<Value>> {
    exprs.iter().map(|e| eval(table, frame, e)).collect()
}

/// Arguments of `each`: a bare identifier that is not a variable is taken as
/// its own name, so `emit enemies.each(hit, 5)` needs no quotes
fn eval_each_args(table: &EntityTable, frame: &Frame, exprs: &[Expr]) -> Result<Vec<Value>> {
    exprs
        .iter()
        .map(|e| match (e, eval(table, frame, e)) {
            (Expr::Variable(name), Err(Error::UnresolvedVariable { .. })) => {
                Ok(Value::String(name.clone()))
            }
            (_, result) => result,
        })
        .collect()
}

fn sync_target(table: &EntityTable, frame: &Frame, target: &EmitTarget) -> Result<EntityId> {
    match target {
        EmitTarget::Implicit | EmitTarget::SelfRef => Ok(frame.entity),
        EmitTarget::Named(name) => table
            .id_of(name)
            .ok_or_else(|| Error::EntityNotFound(name.clone())),
        EmitTarget::Remote { .. } => Err(Error::EntityNotFound(target.describe())),
    }
}

/// Assign to a field when the entity declares it, else to a local
fn assign(table: &mut EntityTable, frame: &mut Frame, name: &str, value: Value) -> Result<()> {
    let entity = table
        .get_mut(frame.entity)
        .ok_or_else(|| Error::EntityNotFound(frame.entity.to_string()))?;
    match entity.get_mut(name) {
        Some(slot) => *slot = value,
        None => {
            frame.scope.insert(name.to_string(), value);
        }
    }
    Ok(())
}

fn assign_index(
    table: &mut EntityTable,
    frame: &Frame,
    pool: &str,
    index: i64,
    value: Value,
) -> Result<()> {
    pool_mut(table, frame.entity, pool)?.set(pool, index, value)
}

fn pool_ref<'t>(table: &'t EntityTable, owner: EntityId, field: &str) -> Result<&'t crate::Pool> {
    table
        .get(owner)
        .and_then(|e| e.get(field))
        .and_then(Value::as_pool)
        .ok_or_else(|| Error::NotAPool(field.to_string()))
}

fn pool_mut<'t>(
    table: &'t mut EntityTable,
    owner: EntityId,
    field: &str,
) -> Result<&'t mut crate::Pool> {
    table
        .get_mut(owner)
        .and_then(|e| e.get_mut(field))
        .and_then(Value::as_pool_mut)
        .ok_or_else(|| Error::NotAPool(field.to_string()))
}

/// Display text for `log`, with entity references shown by name
fn log_text(value: &Value, table: &EntityTable) -> String {
    match value {
        Value::Entity(id) => match table.get(*id) {
            Some(entity) => entity.name.clone(),
            None => value.to_string(),
        },
        Value::Pool(pool) => {
            let items: Vec<String> = pool.iter().map(|v| log_text(v, table)).collect();
            format!("pool[{}]", items.join(", "))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::BufferConsole;
    use crate::expr::BinaryOp;
    use crate::Pool;

    fn event(name: &str, params: &[&str], actions: Vec<Action>) -> Event {
        Event::new(name, params.iter().map(|p| p.to_string()).collect(), actions)
    }

    fn fields(pairs: &[(&str, Value)]) -> ValueMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn engine() -> (Engine, BufferConsole) {
        let console = BufferConsole::new();
        (Engine::new().with_console(console.clone()), console)
    }

    fn increment(field: &str) -> Action {
        Action::set(
            Expr::binary(BinaryOp::Add, Expr::var(field), Expr::lit(1.0)),
            field,
        )
    }

    fn counter() -> (EntityTable, EntityId) {
        let mut table = EntityTable::new();
        let id = table
            .declare(
                "c",
                fields(&[("n", Value::from(0))]),
                vec![event("tick", &["dt"], vec![increment("n")])],
            )
            .unwrap();
        (table, id)
    }

    fn n(table: &EntityTable, id: EntityId) -> Value {
        table.get(id).unwrap().get("n").cloned().unwrap()
    }

    #[test]
    fn test_counter_tick() {
        let (mut table, id) = counter();
        let (mut engine, _) = engine();

        engine.send(&table, id, "tick", vec![Value::from(1.0)]).unwrap();
        engine.run_full_cycle(&mut table);
        assert_eq!(n(&table, id), Value::Number(1.0));

        engine.send(&table, id, "tick", vec![Value::from(1.0)]).unwrap();
        engine.run_full_cycle(&mut table);
        assert_eq!(n(&table, id), Value::Number(2.0));
    }

    #[test]
    fn test_dedup_identical_pending_events() {
        let (mut table, id) = counter();
        let (mut engine, _) = engine();

        engine.send(&table, id, "tick", vec![Value::from(1.0)]).unwrap();
        engine.send(&table, id, "tick", vec![Value::from(1.0)]).unwrap();
        assert_eq!(engine.queue_len(), 1);

        let report = engine.run_full_cycle(&mut table);
        assert_eq!(report.processed, 1);
        assert_eq!(n(&table, id), Value::Number(1.0));

        // different arguments are different events
        engine.send(&table, id, "tick", vec![Value::from(1.0)]).unwrap();
        engine.send(&table, id, "tick", vec![Value::from(2.0)]).unwrap();
        engine.run_full_cycle(&mut table);
        assert_eq!(n(&table, id), Value::Number(3.0));

        engine.send(&table, id, "tick", vec![Value::from(f64::NAN)]).unwrap();
        engine.send(&table, id, "tick", vec![Value::from(f64::NAN)]).unwrap();
        assert_eq!(engine.queue_len(), 1);
    }

    #[test]
    fn test_missing_event_is_silent() {
        let (mut table, id) = counter();
        let (mut engine, console) = engine();
        engine.send(&table, id, "nope", vec![]).unwrap();
        let report = engine.run_full_cycle(&mut table);
        assert_eq!(report.processed, 1);
        assert!(report.is_clean());
        assert!(console.diagnostics().is_empty());
    }

    #[test]
    fn test_fault_isolation() {
        let mut table = EntityTable::new();
        let bad = table
            .declare(
                "bad",
                ValueMap::new(),
                vec![event("go", &[], vec![Action::set(Expr::var("ghost"), "x")])],
            )
            .unwrap();
        let good = table
            .declare(
                "c",
                fields(&[("n", Value::from(0))]),
                vec![event("tick", &[], vec![increment("n")])],
            )
            .unwrap();
        let (mut engine, console) = engine();

        engine.send(&table, bad, "go", vec![]).unwrap();
        engine.send(&table, good, "tick", vec![]).unwrap();
        let report = engine.run_full_cycle(&mut table);

        assert_eq!(report.faults.len(), 1);
        assert_eq!(report.faults[0].entity, "bad");
        assert_eq!(report.faults[0].event, "go");
        assert_eq!(n(&table, good), Value::Number(1.0));
        let diag = console.diagnostics();
        assert!(diag[0].starts_with("[Runtime Error] Entity 'bad', event 'go'"));
        assert!(diag[0].contains("ghost"));
    }

    #[test]
    fn test_argument_count() {
        let (mut table, id) = counter();
        let (mut engine, _) = engine();
        engine.send(&table, id, "tick", vec![]).unwrap();
        let report = engine.run_full_cycle(&mut table);
        assert_eq!(
            report.faults[0].error,
            Error::ArgumentCount {
                event: "tick".into(),
                expected: 1,
                got: 0
            }
        );

        engine.send(&table, id, "tick", vec![Value::from(1), Value::from(2)]).unwrap();
        assert_eq!(engine.run_full_cycle(&mut table).faults.len(), 1);

        let mut lenient = Engine::with_config(EngineConfig {
            strict_arity: false,
            ..EngineConfig::default()
        })
        .with_console(BufferConsole::new());
        lenient.send(&table, id, "tick", vec![Value::from(1), Value::from(2)]).unwrap();
        assert!(lenient.run_full_cycle(&mut table).is_clean());
        assert_eq!(n(&table, id), Value::Number(1.0));
    }

    #[test]
    fn test_check_halts_or_skips() {
        let mut table = EntityTable::new();
        let halting = event(
            "go",
            &[],
            vec![
                Action::Check {
                    condition: Expr::lit(false),
                    then: None,
                },
                increment("n"),
            ],
        );
        let skipping = event(
            "skip",
            &[],
            vec![
                Action::Check {
                    condition: Expr::lit(false),
                    then: Some(Box::new(increment("n"))),
                },
                increment("m"),
            ],
        );
        let id = table
            .declare(
                "e",
                fields(&[("n", Value::from(0)), ("m", Value::from(0))]),
                vec![halting, skipping],
            )
            .unwrap();
        let (mut engine, _) = engine();

        engine.send(&table, id, "go", vec![]).unwrap();
        engine.send(&table, id, "skip", vec![]).unwrap();
        engine.run_full_cycle(&mut table);

        let e = table.get(id).unwrap();
        assert_eq!(e.get("n"), Some(&Value::Number(0.0)));
        assert_eq!(e.get("m"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn test_sync_call_returns_last_assigned() {
        let mut table = EntityTable::new();
        let math = table
            .declare(
                "math",
                ValueMap::new(),
                vec![event(
                    "double",
                    &["x"],
                    vec![Action::set(
                        Expr::binary(BinaryOp::Mul, Expr::var("x"), Expr::lit(2.0)),
                        "result",
                    )],
                )],
            )
            .unwrap();
        let caller = table
            .declare(
                "caller",
                fields(&[("out", Value::Null)]),
                vec![event(
                    "go",
                    &[],
                    vec![Action::EmitWithReturn {
                        target: EmitTarget::Named("math".into()),
                        event: "double".into(),
                        args: vec![Expr::lit(21.0)],
                        field: "out".into(),
                    }],
                )],
            )
            .unwrap();
        let (mut engine, _) = engine();

        engine.send(&table, caller, "go", vec![]).unwrap();
        assert!(engine.run_full_cycle(&mut table).is_clean());
        assert_eq!(table.get(caller).unwrap().get("out"), Some(&Value::Number(42.0)));

        let direct = engine
            .execute_sync(&mut table, math, "double", vec![Value::from(4)])
            .unwrap();
        assert_eq!(direct, Value::Number(8.0));
    }

    #[test]
    fn test_nested_sync_call_faults_and_releases_guard() {
        let mut table = EntityTable::new();
        let sync_to = |callee: &str, event: &str, field: &str| Action::EmitWithReturn {
            target: EmitTarget::Named(callee.into()),
            event: event.into(),
            args: vec![],
            field: field.into(),
        };
        table
            .declare(
                "leaf",
                ValueMap::new(),
                vec![event("value", &[], vec![Action::set(Expr::lit(7.0), "v")])],
            )
            .unwrap();
        table
            .declare(
                "middle",
                ValueMap::new(),
                vec![event("value", &[], vec![sync_to("leaf", "value", "v")])],
            )
            .unwrap();
        let top = table
            .declare(
                "top",
                fields(&[("a", Value::Null), ("b", Value::Null)]),
                vec![
                    event("nested", &[], vec![sync_to("middle", "value", "a")]),
                    event("plain", &[], vec![sync_to("leaf", "value", "b")]),
                ],
            )
            .unwrap();
        let (mut engine, _) = engine();

        engine.send(&table, top, "nested", vec![]).unwrap();
        let report = engine.run_full_cycle(&mut table);
        assert!(matches!(report.faults[0].error, Error::NestedSyncCall { .. }));
        assert_eq!(table.get(top).unwrap().get("a"), Some(&Value::Null));

        engine.send(&table, top, "plain", vec![]).unwrap();
        assert!(engine.run_full_cycle(&mut table).is_clean());
        assert_eq!(table.get(top).unwrap().get("b"), Some(&Value::Number(7.0)));
    }

    #[test]
    fn test_sync_call_missing_event_faults() {
        let (mut table, id) = counter();
        let (mut engine, _) = engine();
        let err = engine.execute_sync(&mut table, id, "nope", vec![]).unwrap_err();
        assert!(matches!(err, Error::EventNotFound { .. }));
        // guard released after the fault
        assert!(engine
            .execute_sync(&mut table, id, "tick", vec![Value::from(1)])
            .is_ok());
    }

    fn hit_setup() -> (EntityTable, EntityId, EntityId) {
        let mut table = EntityTable::new();
        let a = table
            .declare("a", ValueMap::new(), vec![event("hit", &["dmg"], vec![])])
            .unwrap();
        let b = table
            .declare(
                "b",
                fields(&[("taken", Value::from(0)), ("echoes", Value::from(0))]),
                vec![
                    event(
                        "onHit",
                        &["dmg"],
                        vec![
                            Action::set(
                                Expr::binary(BinaryOp::Add, Expr::var("taken"), Expr::var("dmg")),
                                "taken",
                            ),
                            Action::Emit {
                                target: EmitTarget::SelfRef,
                                event: "echo".into(),
                                args: vec![],
                            },
                        ],
                    ),
                    event("echo", &[], vec![increment("echoes")]),
                ],
            )
            .unwrap();
        (table, a, b)
    }

    #[test]
    fn test_subscription_forwards_args() {
        let (mut table, a, b) = hit_setup();
        let (mut engine, _) = engine();
        engine.subscribe(&table, b, "a", "hit", "onHit", None).unwrap();

        engine.send(&table, a, "hit", vec![Value::from(3)]).unwrap();
        let report = engine.run_full_cycle(&mut table);
        assert!(report.is_clean());

        let b = table.get(b).unwrap();
        assert_eq!(b.get("taken"), Some(&Value::Number(3.0)));
        assert_eq!(b.get("echoes"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn test_subscription_handler_args_and_unsubscribe() {
        let (mut table, a, b) = hit_setup();
        let (mut engine, _) = engine();
        engine
            .subscribe(&table, b, "a", "hit", "onHit", Some(vec![Expr::lit(10.0)]))
            .unwrap();
        engine.send(&table, a, "hit", vec![Value::from(3)]).unwrap();
        engine.run_full_cycle(&mut table);
        assert_eq!(table.get(b).unwrap().get("taken"), Some(&Value::Number(10.0)));

        engine.unsubscribe(&table, b, "a", "hit", "onHit").unwrap();
        assert!(engine.subscribers("a", "hit").is_empty());
        engine.send(&table, a, "hit", vec![Value::from(3)]).unwrap();
        engine.run_full_cycle(&mut table);
        assert_eq!(table.get(b).unwrap().get("taken"), Some(&Value::Number(10.0)));
    }

    #[test]
    fn test_self_subscription_is_usage_fault() {
        let (mut table, a, _) = hit_setup();
        table.get_mut(a).unwrap().replace_events(vec![event(
            "init",
            &[],
            vec![Action::When {
                target: "a".into(),
                event: "hit".into(),
                handler: "hit".into(),
                args: None,
            }],
        )]);
        let (mut engine, console) = engine();
        engine.send(&table, a, "init", vec![]).unwrap();
        let report = engine.run_full_cycle(&mut table);

        assert!(report.is_clean());
        assert!(engine.subscribers("a", "hit").is_empty());
        assert!(console.diagnostics()[0].contains("cannot subscribe to its own events"));
    }

    #[test]
    fn test_builtins() {
        let mut table = EntityTable::new();
        let pool: Pool = vec![Value::from(1), Value::from("x")].into();
        let id = table
            .declare(
                "io",
                fields(&[("bag", Value::Pool(pool)), ("age", Value::Null)]),
                vec![event(
                    "go",
                    &[],
                    vec![
                        Action::emit("log", vec![Expr::lit("bag:"), Expr::var("bag")]),
                        Action::emit("input", vec![Expr::lit("age? "), Expr::lit("age")]),
                        Action::emit("host", vec![Expr::lit("ping"), Expr::var("age")]),
                        Action::Emit {
                            target: EmitTarget::SelfRef,
                            event: "destroy".into(),
                            args: vec![],
                        },
                    ],
                )],
            )
            .unwrap();

        let (mut engine, console) = engine();
        console.push_input("42");
        let pings = Rc::new(Cell::new(0.0));
        let sink = Rc::clone(&pings);
        engine.register_callback("ping", move |args: &[Value]| {
            sink.set(args[0].as_number().unwrap_or(-1.0))
        });

        engine.send(&table, id, "go", vec![]).unwrap();
        assert!(engine.run_full_cycle(&mut table).is_clean());

        assert_eq!(console.logs(), vec!["bag: pool[1, x]".to_string()]);
        let io = table.get(id).unwrap();
        assert_eq!(io.get("age"), Some(&Value::Number(42.0)));
        assert_eq!(pings.get(), 42.0);
        assert!(io.is_destroyed());
    }

    #[test]
    fn test_log_names_entity_refs() {
        let mut table = EntityTable::new();
        let orc = table.declare("orc", fields(&[]), vec![]).unwrap();
        let id = table
            .declare(
                "io",
                fields(&[("foe", Value::Entity(orc))]),
                vec![event(
                    "go",
                    &[],
                    vec![Action::emit(
                        "log",
                        vec![Expr::lit("foe:"), Expr::var("foe"), Expr::var("pack")],
                    )],
                )],
            )
            .unwrap();
        let pack: Pool = vec![Value::Entity(orc), Value::Entity(EntityId::new(99))].into();
        table.get_mut(id).unwrap().set("pack", pack);

        let (mut engine, console) = engine();
        engine.send(&table, id, "go", vec![]).unwrap();
        assert!(engine.run_full_cycle(&mut table).is_clean());
        assert_eq!(
            console.logs(),
            vec!["foe: orc pool[orc, entity:99]".to_string()]
        );
    }

    #[test]
    fn test_pool_add_clones_and_inits() {
        let mut table = EntityTable::new();
        table
            .declare(
                "enemy",
                fields(&[("ready", Value::from(false))]),
                vec![event("init", &[], vec![Action::set(Expr::lit(true), "ready")])],
            )
            .unwrap();
        let spawner = table
            .declare(
                "spawner",
                fields(&[("enemies", Value::Pool(Pool::new()))]),
                vec![event(
                    "spawn",
                    &[],
                    vec![Action::Emit {
                        target: EmitTarget::Named("enemies".into()),
                        event: "add".into(),
                        args: vec![Expr::lit("enemy")],
                    }],
                )],
            )
            .unwrap();
        let (mut engine, _) = engine();

        engine.send(&table, spawner, "spawn", vec![]).unwrap();
        assert!(engine.run_full_cycle(&mut table).is_clean());

        let enemies = table.get(spawner).unwrap().get("enemies").unwrap().as_pool().unwrap();
        assert_eq!(enemies.len(), 1);
        let clone = enemies.get("enemies", 1).unwrap().as_entity().unwrap();
        assert_eq!(table.get(clone).unwrap().get("ready"), Some(&Value::Bool(true)));
        // the prototype is untouched
        assert_eq!(table.by_name("enemy").unwrap().get("ready"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_each_and_remote_pool() {
        let mut table = EntityTable::new();
        let a = table
            .declare(
                "a",
                fields(&[("hits", Value::from(0))]),
                vec![event("hit", &["n"], vec![increment("hits")])],
            )
            .unwrap();
        let members: Pool = vec![Value::Entity(a), Value::from("a")].into();
        table
            .declare("bank", fields(&[("coins", Value::Pool(Pool::new()))]), vec![])
            .unwrap();
        let boss = table
            .declare(
                "boss",
                fields(&[("squad", Value::Pool(members))]),
                vec![event(
                    "go",
                    &[],
                    vec![
                        Action::Emit {
                            target: EmitTarget::Named("squad".into()),
                            event: "each".into(),
                            args: vec![Expr::var("hit"), Expr::lit(1.0)],
                        },
                        Action::Emit {
                            target: EmitTarget::Remote {
                                entity: "bank".into(),
                                field: "coins".into(),
                            },
                            event: "push".into(),
                            args: vec![Expr::lit(5.0)],
                        },
                    ],
                )],
            )
            .unwrap();
        let (mut engine, _) = engine();

        engine.send(&table, boss, "go", vec![]).unwrap();
        assert!(engine.run_full_cycle(&mut table).is_clean());
        // both members resolve to `a`; the second send is a duplicate
        assert_eq!(table.get(a).unwrap().get("hits"), Some(&Value::Number(1.0)));
        assert_eq!(
            table.by_name("bank").unwrap().get("coins"),
            Some(&Value::Pool(vec![Value::from(5)].into()))
        );
    }

    #[test]
    fn test_unknown_emit_target_faults() {
        let mut table = EntityTable::new();
        let id = table
            .declare(
                "e",
                ValueMap::new(),
                vec![event(
                    "go",
                    &[],
                    vec![Action::Emit {
                        target: EmitTarget::Named("ghost".into()),
                        event: "boo".into(),
                        args: vec![],
                    }],
                )],
            )
            .unwrap();
        let (mut engine, _) = engine();
        engine.send(&table, id, "go", vec![]).unwrap();
        let report = engine.run_full_cycle(&mut table);
        assert_eq!(report.faults[0].error, Error::EntityNotFound("ghost".into()));
    }

    #[test]
    fn test_garbage_collect() {
        let (mut table, a, b) = hit_setup();
        let roster: Pool = vec![Value::Entity(b), Value::Entity(a)].into();
        let owner = table
            .declare("owner", fields(&[("roster", Value::Pool(roster))]), vec![])
            .unwrap();
        let (mut engine, _) = engine();
        engine.subscribe(&table, b, "a", "hit", "onHit", None).unwrap();

        table.get_mut(b).unwrap().destroy();
        let report = engine.garbage_collect(&mut table);

        assert_eq!(report, SweepReport { pool_refs: 1, subscriptions: 1 });
        let roster = table.get(owner).unwrap().get("roster").unwrap().as_pool().unwrap();
        assert_eq!(roster.values(), &[Value::Entity(a)]);
        assert!(engine.subscribers("a", "hit").is_empty());
        // still resolvable until the host discards it
        assert!(table.get(b).is_some());
    }

    #[test]
    fn test_send_named() {
        let (mut table, id) = counter();
        let (mut engine, _) = engine();
        engine.send_named(&table, "c", "tick", vec![Value::from(1)]).unwrap();
        engine.run_full_cycle(&mut table);
        assert_eq!(n(&table, id), Value::Number(1.0));
        assert_eq!(
            engine.send_named(&table, "zzz", "tick", vec![]).unwrap_err(),
            Error::EntityNotFound("zzz".into())
        );
    }
}
