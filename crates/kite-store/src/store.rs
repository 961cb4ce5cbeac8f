//! The store: operations executed against the engine.
//!
//! Everything here runs on the node's local data. Mutations arrive via
//! [`Store::apply`] once consensus has delivered them; reads call
//! [`Store::get`] directly. Scans answer in pages: `limit` is a work
//! budget of page-size-plus-one, a page carries at most `limit - 1`
//! entries, and a non-empty response token means another page exists.
//! Each examined entry spends one unit of the budget whether or not a
//! count threshold lets it into the page, so one round trip never walks
//! more than `limit` entries.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, trace};

use kite_common::{
    KiteError, KiteResult, DEFAULT_CONTEXT_TTL_SECS, DEFAULT_MAX_CONTEXTS,
};
use kite_engine::{CursorState, Engine, SearchStatus};
use kite_proto::{GetRequest, Operation, QueryType, Response, UpdateMode};

use crate::codec::CounterValue;
use crate::context::{Context, ContextManager};
use crate::registry::TableRegistry;

/// Store tuning knobs.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Cap on concurrently live scan contexts.
    pub max_contexts: usize,
    /// Idle lifetime of a parked context before the sweeper closes it.
    pub context_ttl: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_contexts: DEFAULT_MAX_CONTEXTS,
            context_ttl: Duration::from_secs(DEFAULT_CONTEXT_TTL_SECS),
        }
    }
}

/// The node-local store.
pub struct Store {
    engine: Engine,
    registry: Arc<TableRegistry>,
    contexts: ContextManager,
}

impl Store {
    /// Opens a store over a fresh engine.
    #[must_use]
    pub fn new(options: StoreOptions) -> Self {
        Self {
            engine: Engine::new(),
            registry: Arc::new(TableRegistry::new()),
            contexts: ContextManager::new(options.max_contexts, options.context_ttl),
        }
    }

    /// Decodes and executes a delivered payload.
    ///
    /// This is the replicated apply path; it must stay deterministic
    /// across nodes for mutations. Decode failures and execution errors
    /// both map onto a wire response, never a panic.
    pub fn apply(&self, payload: &[u8]) -> Response {
        match Operation::decode(payload) {
            Ok(op) => self.execute(&op),
            Err(e) => Response::from(&e),
        }
    }

    /// Executes one operation, folding errors into the response.
    pub fn execute(&self, op: &Operation) -> Response {
        let result = match op {
            Operation::Create { table } => self.create_table(table),
            Operation::Drop { table } => self.drop_table(table),
            Operation::Insert {
                table,
                keys,
                values,
            } => self.insert(table, keys, values),
            Operation::Update {
                table,
                mode,
                keys,
                values,
            } => self.update(table, *mode, keys, values),
            Operation::Get(request) => self.get(request),
        };
        match result {
            Ok(response) => response,
            Err(e) => Response::from(&e),
        }
    }

    /// Creates a table. Creating an existing table succeeds with a note;
    /// replays of a Create through the replicated log must be harmless.
    pub fn create_table(&self, table: &str) -> KiteResult<Response> {
        match self.registry.register(table) {
            Ok(()) => {
                self.engine.create_table(table)?;
                debug!(table, "table created");
                Ok(Response::ok("table created"))
            }
            Err(KiteError::TableExists { .. }) => Ok(Response::ok("table already exists")),
            Err(e) => Err(e),
        }
    }

    /// Drops a table once its live contexts have drained.
    ///
    /// Dropping a missing table succeeds with a note, for the same
    /// replay reason as create. A table that stays busy past the drain
    /// budget fails with `TableBusy`, which reaches the client as Retry
    /// with nothing destroyed.
    pub fn drop_table(&self, table: &str) -> KiteResult<Response> {
        if !self.registry.contains(table) {
            return Ok(Response::ok("table does not exist"));
        }
        self.registry.begin_drop(table)?;
        self.engine.drop_table(table)?;
        self.registry.finish_drop(table);
        debug!(table, "table dropped");
        Ok(Response::ok("table dropped"))
    }

    /// Writes (key, value) pairs verbatim.
    pub fn insert(&self, table: &str, keys: &[Bytes], values: &[Bytes]) -> KiteResult<Response> {
        if keys.len() != values.len() {
            return Err(KiteError::LengthMismatch {
                keys: keys.len(),
                values: values.len(),
            });
        }
        let mut context = self.open_mutation(table)?;
        let cursor = context.cursor();
        for (key, value) in keys.iter().zip(values) {
            cursor.set_key(key);
            cursor.set_value(value);
            cursor.insert()?;
        }
        context.close();
        trace!(table, count = keys.len(), "insert applied");
        Ok(Response::ok("OK"))
    }

    /// Updates keys under an explicit mode.
    ///
    /// Increment and Accumulate read-modify-write the counter-prefixed
    /// layout per key, so a key repeated within one batch is counted
    /// once per occurrence, exactly as it would be across batches.
    pub fn update(
        &self,
        table: &str,
        mode: UpdateMode,
        keys: &[Bytes],
        values: &[Bytes],
    ) -> KiteResult<Response> {
        let expected_values = match mode {
            UpdateMode::Increment => 0,
            UpdateMode::Overwrite | UpdateMode::Accumulate => keys.len(),
        };
        if values.len() != expected_values {
            return Err(KiteError::LengthMismatch {
                keys: keys.len(),
                values: values.len(),
            });
        }

        let mut context = self.open_mutation(table)?;
        let cursor = context.cursor();
        for (i, key) in keys.iter().enumerate() {
            cursor.set_key(key);
            let existing = if cursor.search()? { cursor.value() } else { None };

            let encoded = match mode {
                UpdateMode::Overwrite => values[i].clone(),
                UpdateMode::Increment => match existing {
                    Some(current) => CounterValue::decode(&current)?.incremented().encode(),
                    None => CounterValue::initial(Bytes::new()).encode(),
                },
                UpdateMode::Accumulate => match existing {
                    Some(current) => CounterValue::decode(&current)?
                        .accumulated(&values[i])
                        .encode(),
                    None => CounterValue::initial(values[i].clone()).encode(),
                },
            };

            cursor.set_key(key);
            cursor.set_value(&encoded);
            cursor.update()?;
        }
        context.close();
        trace!(table, count = keys.len(), ?mode, "update applied");
        Ok(Response::ok("OK"))
    }

    /// Answers a read.
    ///
    /// Fresh queries open a context on the named table; tokened requests
    /// resume the parked context or, when the token is stale, answer
    /// with an empty OK response. Reading a table that does not exist is
    /// likewise an empty OK, not an error.
    pub fn get(&self, request: &GetRequest) -> KiteResult<Response> {
        if request.has_token() {
            return self.resume(request);
        }
        match request.query {
            QueryType::Done => Ok(Response::empty()),
            QueryType::Equal => self.get_equal(request),
            QueryType::GreaterEqual | QueryType::LessEqual | QueryType::Between => {
                self.get_scan(request)
            }
        }
    }

    /// Closes every parked context idle past the TTL.
    pub fn sweep_contexts(&self) -> usize {
        self.contexts.sweep()
    }

    /// Names of all live tables.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.registry.table_names()
    }

    /// Entry count of a table, zero when absent.
    #[must_use]
    pub fn table_len(&self, table: &str) -> usize {
        self.engine.table_len(table)
    }

    /// Number of live scan contexts, parked or mid-request.
    #[must_use]
    pub fn live_contexts(&self) -> usize {
        self.contexts.live_len()
    }

    /// Number of scans currently parked under a token.
    #[must_use]
    pub fn parked_contexts(&self) -> usize {
        self.contexts.parked_len()
    }

    fn open_mutation(&self, table: &str) -> KiteResult<Context> {
        // Mutations take a context too: the same admission cap and the
        // same drop gate govern them.
        self.contexts
            .open(&self.engine, &self.registry, table, QueryType::Equal)
    }

    fn get_equal(&self, request: &GetRequest) -> KiteResult<Response> {
        let mut context = match self.contexts.open(
            &self.engine,
            &self.registry,
            &request.table,
            QueryType::Equal,
        ) {
            Ok(context) => context,
            Err(KiteError::TableNotFound { .. }) => return Ok(Response::ok("table does not exist")),
            Err(e) => return Err(e),
        };

        let cursor = context.cursor();
        cursor.set_key(&request.key);
        let response = if cursor.search()? {
            match cursor.value() {
                Some(value) => Response::page("", vec![request.key.clone()], vec![value]),
                None => Response::empty(),
            }
        } else {
            Response::empty()
        };
        context.close();
        Ok(response)
    }

    fn get_scan(&self, request: &GetRequest) -> KiteResult<Response> {
        let mut context = match self.contexts.open(
            &self.engine,
            &self.registry,
            &request.table,
            request.query,
        ) {
            Ok(context) => context,
            Err(KiteError::TableNotFound { .. }) => return Ok(Response::ok("table does not exist")),
            Err(e) => return Err(e),
        };
        if request.query == QueryType::Between {
            context.bound = Some(request.key2.clone());
            context.threshold = request.count_threshold;
        }

        let cursor = context.cursor();
        cursor.set_key(&request.key);
        match cursor.search_near()? {
            SearchStatus::Found | SearchStatus::NotFound => {}
            SearchStatus::Larger => {
                // Descending scans must not start past the seek key.
                if request.query == QueryType::LessEqual {
                    cursor.prev()?;
                }
            }
            SearchStatus::Smaller => {
                if request.query != QueryType::LessEqual {
                    cursor.next()?;
                }
            }
        }

        let (keys, values) = Self::fill_page(&mut context, request.limit)?;
        Ok(self.finish_page(context, keys, values))
    }

    fn resume(&self, request: &GetRequest) -> KiteResult<Response> {
        let Some(mut context) = self.contexts.resolve(&request.token) else {
            return Ok(Response::empty());
        };
        if request.query == QueryType::Done {
            trace!(token = %request.token, "scan released");
            context.close();
            return Ok(Response::ok("OK"));
        }

        let (keys, values) = Self::fill_page(&mut context, request.limit)?;
        Ok(self.finish_page(context, keys, values))
    }

    /// Collects up to `limit - 1` entries from the context's cursor.
    ///
    /// The cursor is parked on the next entry to return, both on entry
    /// and, when the scan is not done, on exit; continuations pick up
    /// with no duplicate and no gap.
    fn fill_page(context: &mut Context, limit: u32) -> KiteResult<(Vec<Bytes>, Vec<Bytes>)> {
        let mut keys = Vec::new();
        let mut values = Vec::new();
        let kind = context.kind();
        let bound = context.bound.clone();
        let threshold = context.threshold;

        let mut remaining = limit;
        while remaining > 1 {
            let cursor = context.cursor();
            if cursor.state() != CursorState::Valid {
                context.mark_done();
                break;
            }
            let (Some(key), Some(value)) = (cursor.key(), cursor.value()) else {
                context.mark_done();
                break;
            };
            if let Some(bound) = &bound {
                if key.as_ref() > bound.as_ref() {
                    context.mark_done();
                    break;
                }
            }

            let keep = match threshold {
                Some(min) => CounterValue::count_of(&value).is_some_and(|count| count >= min),
                None => true,
            };
            if keep {
                keys.push(key);
                values.push(value);
            }

            let advanced = match kind {
                QueryType::LessEqual => cursor.prev()?,
                _ => cursor.next()?,
            };
            if !advanced {
                context.mark_done();
                break;
            }
            remaining -= 1;
        }
        Ok((keys, values))
    }

    fn finish_page(&self, mut context: Context, keys: Vec<Bytes>, values: Vec<Bytes>) -> Response {
        if context.is_done() {
            context.close();
            Response::page("", keys, values)
        } else {
            let token = self.contexts.park(context);
            trace!(%token, "scan parked");
            Response::page(token, keys, values)
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(StoreOptions::default())
    }
}
