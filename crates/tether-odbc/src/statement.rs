//! Statement lifecycle, parameter binding, and execution.
//!
//! A `Statement` owns one ODBC statement handle. Value buffers for bound
//! parameters stay caller-owned and are never copied; the statement owns only
//! the per-parameter length/indicator arrays the driver reads alongside them.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::ptr::null_mut;
use std::rc::Rc;
use std::time::Duration;

use odbc_sys::{
    CDataType, FreeStmtOption, HStmt, Handle, HandleType, Len, Nullability, Pointer, SqlDataType,
    SqlReturn, StatementAttribute, ULen, SQLBindParameter, SQLCancel, SQLDescribeParam,
    SQLExecDirectW, SQLExecute, SQLFreeStmt, SQLNumResultCols, SQLPrepareW, SQLRowCount,
    SQLSetStmtAttrW, NTS, NULL_DATA,
};

use crate::connection::Connection;
use crate::ctype::{ParamDirection, ParamElement};
use crate::error::OdbcError;
use crate::handle::{self, check, ensure};
use crate::result::ResultSet;
use crate::wide::to_wide;

// ODBC requires indicator storage to survive SQLDescribeParam-driven writes
// of up to 8 elements even for smaller batches.
const MIN_INDICATOR_LEN: usize = 8;

/// Outcome of one step of an asynchronous execution.
#[derive(Debug)]
pub enum Async {
    /// The driver is still executing; poll again.
    Pending,
    /// Execution finished. `None` when the statement produced no result set.
    Ready(Option<ResultSet>),
}

struct StatementInner {
    conn: RefCell<Option<Connection>>,
    hstmt: Cell<HStmt>,
    open: Cell<bool>,
    prepared: Cell<bool>,
    async_pending: Cell<bool>,
    indicators: RefCell<BTreeMap<u16, Box<[Len]>>>,
}

/// A prepared or direct-execution statement.
///
/// Cloning yields an alias of the same native statement. The handle is
/// usable only while the owning [`Connection`] stays connected.
#[derive(Clone)]
pub struct Statement {
    inner: Rc<StatementInner>,
}

impl Statement {
    /// Create an unopened statement.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(StatementInner {
                conn: RefCell::new(None),
                hstmt: Cell::new(null_mut()),
                open: Cell::new(false),
                prepared: Cell::new(false),
                async_pending: Cell::new(false),
                indicators: RefCell::new(BTreeMap::new()),
            }),
        }
    }

    /// Associate this statement with a connection and allocate its handle.
    ///
    /// # Errors
    ///
    /// `Programming` when already open or when `conn` is not connected;
    /// `Database` when the driver refuses the allocation.
    pub fn open(&self, conn: &Connection) -> Result<(), OdbcError> {
        if self.inner.open.get() {
            return Err(OdbcError::programming(
                "statement is already open; close() it before reassociating",
            ));
        }
        conn.ensure_connected()?;
        // SAFETY: the connection handle is live while `conn` is connected.
        let hstmt = unsafe { handle::alloc(HandleType::Stmt, conn.dbc_handle())? as HStmt };
        self.inner.hstmt.set(hstmt);
        self.inner.open.set(true);
        *self.inner.conn.borrow_mut() = Some(conn.clone());
        tracing::debug!("statement handle allocated");
        Ok(())
    }

    /// True while the statement holds a live handle.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.open.get()
    }

    /// True once a query has been compiled with [`Statement::prepare`].
    #[must_use]
    pub fn is_prepared(&self) -> bool {
        self.inner.prepared.get()
    }

    /// Compile `query` on an already-open statement.
    ///
    /// # Errors
    ///
    /// `Programming` when the statement is not open; `Database` when the
    /// driver rejects the query text.
    pub fn prepare(&self, query: &str) -> Result<(), OdbcError> {
        let hstmt = self.open_handle()?;
        let text = to_wide(query);
        // SAFETY: hstmt is live; the text buffer outlives the call.
        unsafe {
            let rc = SQLPrepareW(hstmt, text.as_ptr(), text.len() as i32);
            ensure("SQLPrepareW", rc, hstmt as Handle, HandleType::Stmt)?;
        }
        self.inner.prepared.set(true);
        Ok(())
    }

    /// Open on `conn` if necessary, then compile `query`.
    ///
    /// # Errors
    ///
    /// See [`Statement::open`] and [`Statement::prepare`].
    pub fn prepare_on(&self, conn: &Connection, query: &str) -> Result<(), OdbcError> {
        if !self.inner.open.get() {
            self.open(conn)?;
        }
        self.prepare(query)
    }

    /// Execute the prepared query.
    ///
    /// `batch_operations` is the number of logical rows each bound parameter
    /// array supplies; it also becomes the result's rowset size. Returns
    /// `None` when the statement produced no result set (inserts, DDL).
    ///
    /// # Errors
    ///
    /// `Programming` when not prepared or when an asynchronous execution is
    /// still pending; `Database` on driver failure.
    pub fn execute(&self, batch_operations: usize) -> Result<Option<ResultSet>, OdbcError> {
        let hstmt = self.prepared_handle()?;
        self.ensure_no_pending()?;
        self.prepare_execution(hstmt, batch_operations)?;
        // SAFETY: hstmt is live and prepared; bound parameter buffers are
        // valid per the bind_* contracts.
        let rc = unsafe {
            let rc = SQLExecute(hstmt);
            check("SQLExecute", rc, hstmt as Handle, HandleType::Stmt)?
        };
        self.finish_execution(rc, batch_operations)
    }

    /// Open on `conn`, then compile and run `query` in one round trip.
    ///
    /// # Errors
    ///
    /// See [`Statement::open`] and [`Statement::execute`].
    pub fn execute_direct(
        &self,
        conn: &Connection,
        query: &str,
        batch_operations: usize,
    ) -> Result<Option<ResultSet>, OdbcError> {
        if !self.inner.open.get() {
            self.open(conn)?;
        }
        let hstmt = self.open_handle()?;
        self.ensure_no_pending()?;
        self.prepare_execution(hstmt, batch_operations)?;
        let text = to_wide(query);
        // SAFETY: hstmt is live; the text buffer outlives the call; bound
        // parameter buffers are valid per the bind_* contracts.
        let rc = unsafe {
            let rc = SQLExecDirectW(hstmt, text.as_ptr(), text.len() as i32);
            check("SQLExecDirectW", rc, hstmt as Handle, HandleType::Stmt)?
        };
        self.finish_execution(rc, batch_operations)
    }

    /// Toggle the driver's asynchronous execution mode for this statement.
    ///
    /// # Errors
    ///
    /// `Programming` when not open; `Database` when the driver does not
    /// support statement-level asynchronous execution.
    pub fn set_async(&self, enabled: bool) -> Result<(), OdbcError> {
        let hstmt = self.open_handle()?;
        self.set_attr(hstmt, StatementAttribute::AsyncEnable, usize::from(enabled))
    }

    /// Start (or poll) an asynchronous execution of the prepared query.
    ///
    /// While the driver reports it is still executing this returns
    /// [`Async::Pending`]; call it again, or use
    /// [`Statement::complete_execute`] to block until done. The statement
    /// must not be reused for another operation before finalization.
    ///
    /// # Errors
    ///
    /// `Programming` when not prepared; `Database` on driver failure.
    pub fn execute_async(&self, batch_operations: usize) -> Result<Async, OdbcError> {
        let hstmt = self.prepared_handle()?;
        if !self.inner.async_pending.get() {
            self.prepare_execution(hstmt, batch_operations)?;
        }
        // SAFETY: hstmt is live and prepared; re-invocation while pending is
        // the documented polling form.
        let rc = unsafe {
            let rc = SQLExecute(hstmt);
            check("SQLExecute", rc, hstmt as Handle, HandleType::Stmt)?
        };
        if rc == SqlReturn::STILL_EXECUTING {
            self.inner.async_pending.set(true);
            return Ok(Async::Pending);
        }
        self.inner.async_pending.set(false);
        self.finish_execution(rc, batch_operations).map(Async::Ready)
    }

    /// Block until a pending asynchronous execution completes.
    ///
    /// # Errors
    ///
    /// `Programming` when no asynchronous execution is pending; `Database`
    /// on driver failure.
    pub fn complete_execute(
        &self,
        batch_operations: usize,
    ) -> Result<Option<ResultSet>, OdbcError> {
        if !self.inner.async_pending.get() {
            return Err(OdbcError::programming(
                "no asynchronous execution is pending on this statement",
            ));
        }
        loop {
            match self.execute_async(batch_operations)? {
                Async::Pending => std::thread::sleep(Duration::from_millis(1)),
                Async::Ready(result) => return Ok(result),
            }
        }
    }

    /// Request best-effort cancellation of in-flight work.
    ///
    /// # Errors
    ///
    /// `Programming` when not open; `Database` when the driver refuses the
    /// request. Cancellation itself is not guaranteed.
    pub fn cancel(&self) -> Result<(), OdbcError> {
        let hstmt = self.open_handle()?;
        // SAFETY: hstmt is live.
        unsafe {
            let rc = SQLCancel(hstmt);
            ensure("SQLCancel", rc, hstmt as Handle, HandleType::Stmt)?;
        }
        self.inner.async_pending.set(false);
        Ok(())
    }

    /// Bind a caller-owned array of fixed-size input values to placeholder
    /// `index` (0-indexed). `values.len() > 1` binds a batch: one logical
    /// row per element on the next execute. `nulls`, when given, is a
    /// parallel per-row nullability array at least as long as `values`.
    ///
    /// The binding persists until [`Statement::reset_parameters`] or a
    /// re-bind of the same index. Input only: the driver never writes
    /// through the shared borrow; use [`Statement::bind_parameter_mut`] for
    /// output directions.
    ///
    /// # Errors
    ///
    /// `Programming` when `direction` is not [`ParamDirection::In`], when
    /// not open, when `values` is empty, or when `nulls` is shorter than
    /// `values`; `Database` on driver failure.
    ///
    /// # Safety
    ///
    /// `values` is handed to the driver by pointer, not copied. The caller
    /// must keep the buffer alive, at a stable address, and unmodified by
    /// anything else until the next execute on this statement completes (or
    /// the binding is reset).
    pub unsafe fn bind_parameter<T: ParamElement>(
        &self,
        index: u16,
        values: &[T],
        nulls: Option<&[bool]>,
        direction: ParamDirection,
    ) -> Result<(), OdbcError> {
        if !matches!(direction, ParamDirection::In) {
            return Err(OdbcError::programming(
                "bind_parameter takes input buffers only; use bind_parameter_mut for output directions",
            ));
        }
        self.bind_fixed::<T>(
            index,
            values.as_ptr() as Pointer,
            values.len(),
            nulls,
            direction,
        )
    }

    /// Bind a caller-owned array the driver may write back into, for
    /// [`ParamDirection::Out`], [`ParamDirection::InOut`], or
    /// [`ParamDirection::Return`] placeholders. Per-row lengths written by
    /// the driver are readable afterwards via
    /// [`Statement::parameter_indicator`].
    ///
    /// # Errors
    ///
    /// `Programming` when not open, when `values` is empty, or when `nulls`
    /// is shorter than `values`; `Database` on driver failure.
    ///
    /// # Safety
    ///
    /// `values` is handed to the driver by pointer, not copied. The caller
    /// must keep the buffer alive, at a stable address, and not read or
    /// write it through any other path until the next execute on this
    /// statement completes (or the binding is reset); the driver writes
    /// into it during execution.
    pub unsafe fn bind_parameter_mut<T: ParamElement>(
        &self,
        index: u16,
        values: &mut [T],
        nulls: Option<&[bool]>,
        direction: ParamDirection,
    ) -> Result<(), OdbcError> {
        self.bind_fixed::<T>(
            index,
            values.as_mut_ptr().cast(),
            values.len(),
            nulls,
            direction,
        )
    }

    unsafe fn bind_fixed<T: ParamElement>(
        &self,
        index: u16,
        data: Pointer,
        count: usize,
        nulls: Option<&[bool]>,
        direction: ParamDirection,
    ) -> Result<(), OdbcError> {
        let hstmt = self.open_handle()?;
        let element_size = std::mem::size_of::<T>();
        let indicators = build_indicators(count, element_size as Len, nulls)?;
        let ind_ptr = self.store_indicators(index, indicators);
        let described = self.describe_param(hstmt, index);
        let (sql_type, column_size, digits) =
            described.unwrap_or((T::sql_data_type(), T::column_size(), 0));
        // SAFETY: value buffer validity is the caller's contract; the
        // indicator array is owned by this statement and outlives the bind.
        let rc = SQLBindParameter(
            hstmt,
            index + 1,
            direction.to_param_type(),
            T::c_data_type(),
            sql_type,
            column_size as ULen,
            digits,
            data,
            element_size as Len,
            ind_ptr,
        );
        ensure("SQLBindParameter", rc, hstmt as Handle, HandleType::Stmt)
    }

    /// Bind a batch of UTF-16 strings stored in one flat caller-owned
    /// buffer: `count` rows of `element_len` code units each, every row
    /// null terminated within its slot.
    ///
    /// # Errors
    ///
    /// `Programming` when `direction` is not [`ParamDirection::In`], when
    /// not open, when the buffer is smaller than `element_len * count`, or
    /// when `nulls` is shorter than `count`; `Database` on driver failure.
    ///
    /// # Safety
    ///
    /// Same buffer-validity contract as [`Statement::bind_parameter`].
    pub unsafe fn bind_text(
        &self,
        index: u16,
        buffer: &[u16],
        element_len: usize,
        count: usize,
        nulls: Option<&[bool]>,
        direction: ParamDirection,
    ) -> Result<(), OdbcError> {
        if !matches!(direction, ParamDirection::In) {
            return Err(OdbcError::programming(
                "bind_text takes input buffers only",
            ));
        }
        let hstmt = self.open_handle()?;
        if buffer.len() < element_len * count {
            return Err(OdbcError::programming(
                "text buffer is smaller than element_len * count",
            ));
        }
        let indicators = build_indicators(count, NTS, nulls)?;
        let ind_ptr = self.store_indicators(index, indicators);
        let described = self.describe_param(hstmt, index);
        let (sql_type, column_size, digits) =
            described.unwrap_or((SqlDataType::EXT_W_VARCHAR, element_len.max(1), 0));
        // SAFETY: value buffer validity is the caller's contract.
        let rc = SQLBindParameter(
            hstmt,
            index + 1,
            direction.to_param_type(),
            CDataType::WChar,
            sql_type,
            column_size as ULen,
            digits,
            buffer.as_ptr() as Pointer,
            (element_len * 2) as Len,
            ind_ptr,
        );
        ensure("SQLBindParameter", rc, hstmt as Handle, HandleType::Stmt)
    }

    /// Bind a batch of binary values stored in one flat caller-owned buffer:
    /// `lengths.len()` rows of up to `element_len` bytes each, with
    /// `lengths[i]` giving row `i`'s actual byte count.
    ///
    /// # Errors
    ///
    /// `Programming` when `direction` is not [`ParamDirection::In`], when
    /// not open, when the buffer is smaller than
    /// `element_len * lengths.len()`, when any length exceeds `element_len`,
    /// or when `nulls` is shorter than `lengths`; `Database` on driver
    /// failure.
    ///
    /// # Safety
    ///
    /// Same buffer-validity contract as [`Statement::bind_parameter`].
    pub unsafe fn bind_binary(
        &self,
        index: u16,
        buffer: &[u8],
        element_len: usize,
        lengths: &[usize],
        nulls: Option<&[bool]>,
        direction: ParamDirection,
    ) -> Result<(), OdbcError> {
        if !matches!(direction, ParamDirection::In) {
            return Err(OdbcError::programming(
                "bind_binary takes input buffers only",
            ));
        }
        let hstmt = self.open_handle()?;
        if buffer.len() < element_len * lengths.len() {
            return Err(OdbcError::programming(
                "binary buffer is smaller than element_len * count",
            ));
        }
        if lengths.iter().any(|&len| len > element_len) {
            return Err(OdbcError::programming(
                "binary element length exceeds the slot size",
            ));
        }
        let mut indicators = build_indicators(lengths.len(), 0, nulls)?;
        for (slot, &len) in indicators.iter_mut().zip(lengths) {
            if *slot != NULL_DATA {
                *slot = len as Len;
            }
        }
        let ind_ptr = self.store_indicators(index, indicators);
        let described = self.describe_param(hstmt, index);
        let (sql_type, column_size, digits) =
            described.unwrap_or((SqlDataType::EXT_VAR_BINARY, element_len.max(1), 0));
        // SAFETY: value buffer validity is the caller's contract.
        let rc = SQLBindParameter(
            hstmt,
            index + 1,
            direction.to_param_type(),
            CDataType::Binary,
            sql_type,
            column_size as ULen,
            digits,
            buffer.as_ptr() as Pointer,
            element_len as Len,
            ind_ptr,
        );
        ensure("SQLBindParameter", rc, hstmt as Handle, HandleType::Stmt)
    }

    /// Bind placeholder `index` to SQL NULL for `count` batch rows.
    ///
    /// # Errors
    ///
    /// `Programming` when not open or `count` is zero; `Database` on driver
    /// failure.
    pub fn bind_null(&self, index: u16, count: usize) -> Result<(), OdbcError> {
        let hstmt = self.open_handle()?;
        if count == 0 {
            return Err(OdbcError::programming("cannot bind zero null rows"));
        }
        let mut indicators = vec![0 as Len; count.max(MIN_INDICATOR_LEN)].into_boxed_slice();
        indicators.fill(NULL_DATA);
        let ind_ptr = self.store_indicators(index, indicators);
        let described = self.describe_param(hstmt, index);
        let (sql_type, column_size, digits) =
            described.unwrap_or((SqlDataType::CHAR, 1, 0));
        // SAFETY: a null value pointer is permitted when every indicator is
        // the null sentinel; the indicator array outlives the bind.
        unsafe {
            let rc = SQLBindParameter(
                hstmt,
                index + 1,
                ParamDirection::In.to_param_type(),
                CDataType::Char,
                sql_type,
                column_size as ULen,
                digits,
                null_mut(),
                0,
                ind_ptr,
            );
            ensure("SQLBindParameter", rc, hstmt as Handle, HandleType::Stmt)?;
        }
        Ok(())
    }

    /// Length/indicator value recorded for batch row `row` of placeholder
    /// `index`. For output directions the driver writes these back during
    /// execution; `None` means SQL NULL.
    ///
    /// # Errors
    ///
    /// `IndexRange` when no binding exists at `index` or `row` is outside
    /// the binding's indicator storage.
    pub fn parameter_indicator(&self, index: u16, row: usize) -> Result<Option<usize>, OdbcError> {
        let map = self.inner.indicators.borrow();
        let count = map.len() as u16;
        let Some(indicators) = map.get(&index) else {
            return Err(OdbcError::IndexRange { index, count });
        };
        let Some(&value) = indicators.get(row) else {
            return Err(OdbcError::IndexRange {
                index: row as u16,
                count: indicators.len() as u16,
            });
        };
        if value == NULL_DATA {
            Ok(None)
        } else {
            Ok(Some(value.max(0) as usize))
        }
    }

    /// Release all parameter bindings. Never fails outward; a driver error
    /// here is logged and the owned indicator storage is dropped regardless.
    pub fn reset_parameters(&self) {
        if self.inner.open.get() {
            let hstmt = self.inner.hstmt.get();
            // SAFETY: hstmt is live.
            let rc = unsafe { SQLFreeStmt(hstmt, FreeStmtOption::ResetParams) };
            if !handle::succeeded(rc) {
                tracing::warn!("SQLFreeStmt(ResetParams) failed");
            }
        }
        self.inner.indicators.borrow_mut().clear();
    }

    /// Byte size of the bound element the driver expects for placeholder
    /// `index` (0-indexed).
    ///
    /// # Errors
    ///
    /// `Programming` when not open; `Database` when the driver cannot
    /// describe the parameter.
    pub fn parameter_size(&self, index: u16) -> Result<usize, OdbcError> {
        let hstmt = self.open_handle()?;
        let mut sql_type = SqlDataType::UNKNOWN_TYPE;
        let mut size: ULen = 0;
        let mut digits = 0i16;
        let mut nullable = Nullability::UNKNOWN;
        // SAFETY: hstmt is live and all out-pointers are valid.
        unsafe {
            let rc = SQLDescribeParam(
                hstmt,
                index + 1,
                &mut sql_type,
                &mut size,
                &mut digits,
                &mut nullable,
            );
            ensure("SQLDescribeParam", rc, hstmt as Handle, HandleType::Stmt)?;
        }
        Ok(size as usize)
    }

    /// Rows affected by the last execution, or -1 when the backend cannot
    /// report a count (typical for SELECT and some DDL).
    ///
    /// # Errors
    ///
    /// `Programming` when not open; `Database` on driver failure.
    pub fn affected_rows(&self) -> Result<isize, OdbcError> {
        let hstmt = self.open_handle()?;
        let mut rows: Len = 0;
        // SAFETY: hstmt is live.
        unsafe {
            let rc = SQLRowCount(hstmt, &mut rows);
            ensure("SQLRowCount", rc, hstmt as Handle, HandleType::Stmt)?;
        }
        Ok(rows)
    }

    /// Number of columns in the current result metadata.
    ///
    /// # Errors
    ///
    /// `Programming` when not open; `Database` on driver failure.
    pub fn columns(&self) -> Result<u16, OdbcError> {
        let hstmt = self.open_handle()?;
        let mut cols = 0i16;
        // SAFETY: hstmt is live.
        unsafe {
            let rc = SQLNumResultCols(hstmt, &mut cols);
            ensure("SQLNumResultCols", rc, hstmt as Handle, HandleType::Stmt)?;
        }
        Ok(cols.max(0) as u16)
    }

    /// Set the query timeout in seconds (0 disables it).
    ///
    /// # Errors
    ///
    /// `Programming` when not open; `Database` on driver failure.
    pub fn set_timeout(&self, seconds: usize) -> Result<(), OdbcError> {
        let hstmt = self.open_handle()?;
        self.set_attr(hstmt, StatementAttribute::QueryTimeout, seconds)
    }

    /// Cancel outstanding work, drop bindings, and free the handle.
    ///
    /// A no-op on a statement that is not open.
    pub fn close(&self) {
        if !self.inner.open.get() {
            return;
        }
        let hstmt = self.inner.hstmt.get();
        if self.inner.async_pending.get() {
            // SAFETY: hstmt is live; cancellation is best-effort.
            let rc = unsafe { SQLCancel(hstmt) };
            if !handle::succeeded(rc) {
                tracing::debug!("SQLCancel failed during close");
            }
        }
        self.reset_parameters();
        // SAFETY: hstmt is live; after release nothing reads it again.
        unsafe {
            let rc = SQLFreeStmt(hstmt, FreeStmtOption::Close);
            if !handle::succeeded(rc) {
                tracing::debug!("SQLFreeStmt(Close) failed during close");
            }
            handle::release(hstmt as Handle, HandleType::Stmt);
        }
        self.inner.hstmt.set(null_mut());
        self.inner.open.set(false);
        self.inner.prepared.set(false);
        self.inner.async_pending.set(false);
        *self.inner.conn.borrow_mut() = None;
    }

    /// Raw statement handle for native calls bypassing this wrapper.
    ///
    /// Must not be retained past this `Statement`'s lifetime.
    #[must_use]
    pub fn stmt_handle(&self) -> Handle {
        self.inner.hstmt.get() as Handle
    }

    pub(crate) fn hstmt(&self) -> HStmt {
        self.inner.hstmt.get()
    }

    fn open_handle(&self) -> Result<HStmt, OdbcError> {
        if !self.inner.open.get() {
            return Err(OdbcError::programming(
                "statement is not open; associate it with a connection first",
            ));
        }
        if let Some(conn) = self.inner.conn.borrow().as_ref() {
            conn.ensure_connected()?;
        }
        Ok(self.inner.hstmt.get())
    }

    fn prepared_handle(&self) -> Result<HStmt, OdbcError> {
        let hstmt = self.open_handle()?;
        if !self.inner.prepared.get() {
            return Err(OdbcError::programming(
                "statement has no prepared query; call prepare() first",
            ));
        }
        Ok(hstmt)
    }

    fn ensure_no_pending(&self) -> Result<(), OdbcError> {
        if self.inner.async_pending.get() {
            return Err(OdbcError::programming(
                "an asynchronous execution is still pending on this statement",
            ));
        }
        Ok(())
    }

    /// Close any open cursor and publish the batch size before execution.
    fn prepare_execution(&self, hstmt: HStmt, batch_operations: usize) -> Result<(), OdbcError> {
        // SAFETY: hstmt is live. Closing a cursor that is not open is
        // harmless per the ODBC contract for SQLFreeStmt(Close).
        let rc = unsafe { SQLFreeStmt(hstmt, FreeStmtOption::Close) };
        if !handle::succeeded(rc) {
            tracing::debug!("SQLFreeStmt(Close) before execute reported failure");
        }
        self.set_attr(
            hstmt,
            StatementAttribute::ParamsetSize,
            batch_operations.max(1),
        )
    }

    fn finish_execution(
        &self,
        rc: SqlReturn,
        batch_operations: usize,
    ) -> Result<Option<ResultSet>, OdbcError> {
        if rc == SqlReturn::NO_DATA {
            return Ok(None);
        }
        if self.columns()? == 0 {
            return Ok(None);
        }
        ResultSet::bind(self.clone(), batch_operations.max(1)).map(Some)
    }

    fn set_attr(
        &self,
        hstmt: HStmt,
        attribute: StatementAttribute,
        value: usize,
    ) -> Result<(), OdbcError> {
        // SAFETY: hstmt is live; the attribute value is an immediate
        // integer smuggled through the pointer argument as ODBC specifies.
        unsafe {
            let rc = SQLSetStmtAttrW(hstmt, attribute, value as Pointer, 0);
            ensure("SQLSetStmtAttrW", rc, hstmt as Handle, HandleType::Stmt)?;
        }
        Ok(())
    }

    fn describe_param(&self, hstmt: HStmt, index: u16) -> Option<(SqlDataType, usize, i16)> {
        let mut sql_type = SqlDataType::UNKNOWN_TYPE;
        let mut size: ULen = 0;
        let mut digits = 0i16;
        let mut nullable = Nullability::UNKNOWN;
        // SAFETY: hstmt is live and all out-pointers are valid. Many drivers
        // cannot describe parameters; the caller falls back to type defaults.
        let rc = unsafe {
            SQLDescribeParam(
                hstmt,
                index + 1,
                &mut sql_type,
                &mut size,
                &mut digits,
                &mut nullable,
            )
        };
        if handle::succeeded(rc) && sql_type != SqlDataType::UNKNOWN_TYPE && size > 0 {
            Some((sql_type, size as usize, digits))
        } else {
            None
        }
    }

    /// Install an indicator array for `index`, replacing any previous one,
    /// and return a pointer the driver may hold until the next execute.
    fn store_indicators(&self, index: u16, indicators: Box<[Len]>) -> *mut Len {
        let mut map = self.inner.indicators.borrow_mut();
        map.insert(index, indicators);
        // The boxed slice's heap storage is address-stable while it stays in
        // the map, which it does until reset or re-bind of the same index.
        map.get_mut(&index)
            .map(|b| b.as_mut_ptr())
            .unwrap_or(null_mut())
    }
}

impl Default for Statement {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("open", &self.inner.open.get())
            .field("prepared", &self.inner.prepared.get())
            .finish_non_exhaustive()
    }
}

impl Drop for StatementInner {
    fn drop(&mut self) {
        if !self.open.get() {
            return;
        }
        // SAFETY: the handle is owned by this inner and live; failures are
        // logged, never raised.
        unsafe {
            let hstmt = self.hstmt.get();
            let rc = SQLFreeStmt(hstmt, FreeStmtOption::Close);
            if !handle::succeeded(rc) {
                tracing::debug!("SQLFreeStmt(Close) failed during drop");
            }
            handle::release(hstmt as Handle, HandleType::Stmt);
        }
    }
}

/// Build the per-row length/indicator array for a binding of `count` rows.
///
/// `value` is the indicator written for non-null rows (element byte size for
/// fixed types, the null-termination sentinel for text). The array is padded
/// to [`MIN_INDICATOR_LEN`] elements.
fn build_indicators(
    count: usize,
    value: Len,
    nulls: Option<&[bool]>,
) -> Result<Box<[Len]>, OdbcError> {
    if count == 0 {
        return Err(OdbcError::programming("cannot bind an empty value buffer"));
    }
    if let Some(nulls) = nulls {
        if nulls.len() < count {
            return Err(OdbcError::programming(
                "null indicator array is shorter than the value buffer",
            ));
        }
    }
    let mut indicators = vec![value; count.max(MIN_INDICATOR_LEN)].into_boxed_slice();
    if let Some(nulls) = nulls {
        for (slot, &is_null) in indicators.iter_mut().zip(nulls) {
            if is_null {
                *slot = NULL_DATA;
            }
        }
    }
    Ok(indicators)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indicator_array_padded_to_minimum() {
        let ind = build_indicators(3, 4, None).unwrap();
        assert_eq!(ind.len(), MIN_INDICATOR_LEN);
        assert!(ind.iter().all(|&len| len == 4));
    }

    #[test]
    fn test_indicator_array_not_padded_past_count() {
        let ind = build_indicators(12, 8, None).unwrap();
        assert_eq!(ind.len(), 12);
    }

    #[test]
    fn test_null_flags_map_to_null_sentinel() {
        let ind = build_indicators(4, 8, Some(&[false, true, false, true])).unwrap();
        assert_eq!(ind[0], 8);
        assert_eq!(ind[1], NULL_DATA);
        assert_eq!(ind[2], 8);
        assert_eq!(ind[3], NULL_DATA);
        // Padding slots keep the non-null value; the driver never reads them.
        assert_eq!(ind[4], 8);
    }

    #[test]
    fn test_empty_bind_is_rejected() {
        let err = build_indicators(0, 4, None).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_short_null_array_is_rejected() {
        let err = build_indicators(3, 4, Some(&[true])).unwrap_err();
        assert!(err.to_string().contains("shorter"));
    }

    #[test]
    fn test_bind_parameter_rejects_output_directions() {
        let stmt = Statement::new();
        let values = [1i32, 2];
        for direction in [
            ParamDirection::Out,
            ParamDirection::InOut,
            ParamDirection::Return,
        ] {
            // SAFETY: the call is rejected before the driver sees the buffer.
            let err = unsafe {
                stmt.bind_parameter(0, &values, None, direction).unwrap_err()
            };
            assert!(err.to_string().contains("input buffers only"));
        }
    }

    #[test]
    fn test_bind_text_and_binary_reject_output_directions() {
        let stmt = Statement::new();
        // SAFETY: the calls are rejected before the driver sees the buffers.
        unsafe {
            let err = stmt
                .bind_text(0, &[0u16; 8], 4, 2, None, ParamDirection::Out)
                .unwrap_err();
            assert!(err.to_string().contains("input buffers only"));
            let err = stmt
                .bind_binary(0, &[0u8; 8], 4, &[2, 3], None, ParamDirection::InOut)
                .unwrap_err();
            assert!(err.to_string().contains("input buffers only"));
        }
    }

    #[test]
    fn test_parameter_indicator_requires_a_binding() {
        let stmt = Statement::new();
        assert!(matches!(
            stmt.parameter_indicator(0, 0),
            Err(OdbcError::IndexRange { index: 0, count: 0 })
        ));
    }

    #[test]
    fn test_unopened_statement_rejects_prepare() {
        let stmt = Statement::new();
        let err = stmt.prepare("SELECT 1;").unwrap_err();
        assert!(matches!(err, OdbcError::Programming(_)));
    }

    #[test]
    fn test_unopened_statement_rejects_execute() {
        let stmt = Statement::new();
        assert!(stmt.execute(1).is_err());
        assert!(!stmt.is_open());
        assert!(!stmt.is_prepared());
    }
}
