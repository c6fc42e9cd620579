//! Rowset cursor over a statement's output.
//!
//! All column buffers are allocated once at construction, sized
//! `rowset_size * stride`, bound with `SQLBindCol`, and refilled in place on
//! every fetch. `get` copies values out into owned scalars/strings, so the
//! buffer-reuse rule cannot be violated through safe code.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use odbc_sys::{
    CDataType, FetchOrientation, FreeStmtOption, Handle, HandleType, Len, Nullability, Pointer,
    SqlDataType, SqlReturn, StatementAttribute, ULen, SQLBindCol, SQLDescribeColW, SQLFetchScroll,
    SQLFreeStmt, SQLGetStmtAttrW, SQLMoreResults, SQLNumResultCols, SQLSetStmtAttrW, NO_TOTAL,
    NULL_DATA,
};

use crate::ctype::{Date, Timestamp};
use crate::error::OdbcError;
use crate::handle::{self, check, ensure};
use crate::statement::Statement;
use crate::wide::from_wide_len;

// Slot payload caps for columns whose declared size the driver reports as
// unbounded (long varchar/varbinary) or unknown.
const LONG_TEXT_CHARS: usize = 4096;
const LONG_BINARY_BYTES: usize = 4096;
const DEFAULT_TEXT_CHARS: usize = 128;

struct BoundColumn {
    name: String,
    sql_type: SqlDataType,
    sql_size: usize,
    nullable: bool,
    ctype: CDataType,
    /// Bytes per row slot in `data`.
    stride: usize,
    data: Vec<u8>,
    indicators: Vec<Len>,
}

struct ResultInner {
    stmt: Statement,
    rowset_size: usize,
    /// Written by the driver through the rows-fetched pointer; lives inside
    /// the `Rc` allocation so its address is stable for the cursor's life.
    rows_fetched: Cell<ULen>,
    columns: RefCell<Vec<BoundColumn>>,
    rowset_pos: Cell<usize>,
    fetched: Cell<bool>,
    at_end: Cell<bool>,
}

/// A cursor over one result set, advanced rowset-by-rowset.
///
/// Cloning yields an alias of the same native cursor and buffers.
#[derive(Clone)]
pub struct ResultSet {
    inner: Rc<ResultInner>,
}

impl ResultSet {
    pub(crate) fn bind(stmt: Statement, rowset_size: usize) -> Result<Self, OdbcError> {
        let result = Self {
            inner: Rc::new(ResultInner {
                stmt,
                rowset_size,
                rows_fetched: Cell::new(0),
                columns: RefCell::new(Vec::new()),
                rowset_pos: Cell::new(0),
                fetched: Cell::new(false),
                at_end: Cell::new(false),
            }),
        };
        result.setup_rowset()?;
        result.describe_and_bind()?;
        Ok(result)
    }

    fn setup_rowset(&self) -> Result<(), OdbcError> {
        let hstmt = self.inner.stmt.hstmt();
        // SAFETY: hstmt is live; the rows-fetched cell sits inside the Rc
        // allocation and outlives the binding (cleared again on drop).
        unsafe {
            let rc = SQLSetStmtAttrW(
                hstmt,
                StatementAttribute::RowBindType,
                std::ptr::null_mut(), // columnar binding
                0,
            );
            ensure("SQLSetStmtAttrW", rc, hstmt as Handle, HandleType::Stmt)?;
            let rc = SQLSetStmtAttrW(
                hstmt,
                StatementAttribute::RowArraySize,
                self.inner.rowset_size as Pointer,
                0,
            );
            ensure("SQLSetStmtAttrW", rc, hstmt as Handle, HandleType::Stmt)?;
            let rc = SQLSetStmtAttrW(
                hstmt,
                StatementAttribute::RowsFetchedPtr,
                self.inner.rows_fetched.as_ptr().cast(),
                0,
            );
            ensure("SQLSetStmtAttrW", rc, hstmt as Handle, HandleType::Stmt)?;
        }
        Ok(())
    }

    /// Describe every output column and bind a rowset-sized buffer for each.
    fn describe_and_bind(&self) -> Result<(), OdbcError> {
        let hstmt = self.inner.stmt.hstmt();
        let mut count = 0i16;
        // SAFETY: hstmt is live.
        unsafe {
            let rc = SQLNumResultCols(hstmt, &mut count);
            ensure("SQLNumResultCols", rc, hstmt as Handle, HandleType::Stmt)?;
        }
        let count = count.max(0) as u16;
        let mut columns = Vec::with_capacity(count as usize);
        for index in 0..count {
            let mut name_buf = [0u16; 256];
            let mut name_len = 0i16;
            let mut sql_type = SqlDataType::UNKNOWN_TYPE;
            let mut sql_size: ULen = 0;
            let mut digits = 0i16;
            let mut nullable = Nullability::UNKNOWN;
            // SAFETY: hstmt is live and all out-pointers are valid.
            unsafe {
                let rc = SQLDescribeColW(
                    hstmt,
                    index + 1,
                    name_buf.as_mut_ptr(),
                    name_buf.len() as i16,
                    &mut name_len,
                    &mut sql_type,
                    &mut sql_size,
                    &mut digits,
                    &mut nullable,
                );
                ensure("SQLDescribeColW", rc, hstmt as Handle, HandleType::Stmt)?;
            }
            let (ctype, stride) = plan_binding(sql_type, sql_size as usize);
            let mut column = BoundColumn {
                name: from_wide_len(&name_buf, name_len.max(0) as usize),
                sql_type,
                sql_size: sql_size as usize,
                nullable: nullable != Nullability::NO_NULLS,
                ctype,
                stride,
                data: vec![0u8; stride * self.inner.rowset_size],
                indicators: vec![0 as Len; self.inner.rowset_size],
            };
            // SAFETY: hstmt is live; both buffers live inside the column we
            // are about to move into the Vec, and Vec heap storage keeps a
            // stable address while the element stays in place (the Vec is
            // only ever rebuilt after an Unbind).
            unsafe {
                let rc = SQLBindCol(
                    hstmt,
                    index + 1,
                    ctype,
                    column.data.as_mut_ptr().cast(),
                    stride as Len,
                    column.indicators.as_mut_ptr(),
                );
                ensure("SQLBindCol", rc, hstmt as Handle, HandleType::Stmt)?;
            }
            columns.push(column);
        }
        *self.inner.columns.borrow_mut() = columns;
        Ok(())
    }

    /// Fetch the first rowset.
    ///
    /// # Errors
    ///
    /// `Database` on driver failure.
    pub fn first(&self) -> Result<bool, OdbcError> {
        if self.inner.at_end.get() {
            return Ok(false);
        }
        self.fetch(FetchOrientation::First, 0)
    }

    /// Fetch the last rowset.
    ///
    /// # Errors
    ///
    /// `Database` on driver failure.
    pub fn last(&self) -> Result<bool, OdbcError> {
        if self.inner.at_end.get() {
            return Ok(false);
        }
        self.fetch(FetchOrientation::Last, 0)
    }

    /// Advance to the next row, fetching the next rowset only when the
    /// current one is exhausted.
    ///
    /// # Errors
    ///
    /// `Database` on driver failure.
    pub fn next(&self) -> Result<bool, OdbcError> {
        if self.inner.at_end.get() {
            return Ok(false);
        }
        if self.inner.fetched.get() {
            let next_pos = self.inner.rowset_pos.get() + 1;
            if next_pos < self.inner.rows_fetched.get() as usize {
                self.inner.rowset_pos.set(next_pos);
                return Ok(true);
            }
        }
        self.fetch(FetchOrientation::Next, 0)
    }

    /// Step back one row, refetching the prior rowset when needed.
    ///
    /// # Errors
    ///
    /// `Database` on driver failure.
    pub fn prior(&self) -> Result<bool, OdbcError> {
        if self.inner.at_end.get() {
            return Ok(false);
        }
        if self.inner.fetched.get() {
            let pos = self.inner.rowset_pos.get();
            if pos > 0 {
                self.inner.rowset_pos.set(pos - 1);
                return Ok(true);
            }
        }
        self.fetch(FetchOrientation::Prior, 0)
    }

    /// Position on an absolute 1-based row.
    ///
    /// # Errors
    ///
    /// `Database` on driver failure.
    pub fn move_to(&self, row: usize) -> Result<bool, OdbcError> {
        if self.inner.at_end.get() {
            return Ok(false);
        }
        self.fetch(FetchOrientation::Absolute, row as Len)
    }

    /// Move `rows` relative to the current position (may be negative).
    ///
    /// # Errors
    ///
    /// `Database` on driver failure.
    pub fn skip(&self, rows: isize) -> Result<bool, OdbcError> {
        if self.inner.at_end.get() {
            return Ok(false);
        }
        if rows == 0 {
            return Ok(self.inner.fetched.get());
        }
        // Relative fetch offsets count from the start of the current rowset.
        let offset = self.inner.rowset_pos.get() as isize + rows;
        self.fetch(FetchOrientation::Relative, offset as Len)
    }

    fn fetch(&self, orientation: FetchOrientation, offset: Len) -> Result<bool, OdbcError> {
        let hstmt = self.inner.stmt.hstmt();
        self.inner.rows_fetched.set(0);
        // SAFETY: hstmt is live; all column buffers registered with
        // SQLBindCol are alive inside this ResultSet.
        let rc = unsafe {
            let rc = SQLFetchScroll(hstmt, orientation, offset);
            check("SQLFetchScroll", rc, hstmt as Handle, HandleType::Stmt)?
        };
        if rc == SqlReturn::NO_DATA || self.inner.rows_fetched.get() == 0 {
            self.inner.at_end.set(true);
            return Ok(false);
        }
        self.inner.fetched.set(true);
        self.inner.rowset_pos.set(0);
        Ok(true)
    }

    /// True once navigation has run past the final row.
    #[must_use]
    pub fn end(&self) -> bool {
        self.inner.at_end.get()
    }

    /// 1-based position of the current row, 0 before the first fetch.
    ///
    /// # Errors
    ///
    /// `Database` when the driver cannot report the cursor row number.
    pub fn position(&self) -> Result<usize, OdbcError> {
        if !self.inner.fetched.get() {
            return Ok(0);
        }
        let hstmt = self.inner.stmt.hstmt();
        let mut row: ULen = 0;
        // SAFETY: hstmt is live; the out value is a ULen as the row-number
        // attribute requires.
        unsafe {
            let rc = SQLGetStmtAttrW(
                hstmt,
                StatementAttribute::RowNumber,
                (&mut row as *mut ULen).cast(),
                0,
                std::ptr::null_mut(),
            );
            ensure("SQLGetStmtAttrW", rc, hstmt as Handle, HandleType::Stmt)?;
        }
        Ok(row as usize + self.inner.rowset_pos.get())
    }

    /// Rows delivered by the most recent fetch.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.inner.rows_fetched.get() as usize
    }

    /// The rowset size fixed at execution time.
    #[must_use]
    pub fn rowset_size(&self) -> usize {
        self.inner.rowset_size
    }

    /// Rows affected by the producing statement, -1 when unreported.
    ///
    /// # Errors
    ///
    /// `Database` on driver failure.
    pub fn affected_rows(&self) -> Result<isize, OdbcError> {
        self.inner.stmt.affected_rows()
    }

    /// Number of columns in this result set.
    #[must_use]
    pub fn columns(&self) -> u16 {
        self.inner.columns.borrow().len() as u16
    }

    /// Decode the current row's column `index` (0-indexed) as `T`.
    ///
    /// # Errors
    ///
    /// `IndexRange` outside `[0, columns())`; `Programming` when there is no
    /// current row; `NullAccess` on a null value; `TypeIncompatible` when
    /// the column's buffer type cannot represent `T`.
    pub fn get<T: FromColumn>(&self, index: u16) -> Result<T, OdbcError> {
        let row = self.current_row(index)?;
        if self.indicator(index, row) == NULL_DATA {
            return Err(OdbcError::NullAccess { column: index });
        }
        T::decode(self, index, row)
    }

    /// Like [`ResultSet::get`], but a null value yields `fallback` instead
    /// of an error.
    ///
    /// # Errors
    ///
    /// As [`ResultSet::get`], except `NullAccess` cannot occur.
    pub fn get_or<T: FromColumn>(&self, index: u16, fallback: T) -> Result<T, OdbcError> {
        let row = self.current_row(index)?;
        if self.indicator(index, row) == NULL_DATA {
            return Ok(fallback);
        }
        T::decode(self, index, row)
    }

    /// True when the current row's column `index` is null.
    ///
    /// # Errors
    ///
    /// `IndexRange` outside `[0, columns())`; `Programming` when there is no
    /// current row.
    pub fn is_null(&self, index: u16) -> Result<bool, OdbcError> {
        let row = self.current_row(index)?;
        Ok(self.indicator(index, row) == NULL_DATA)
    }

    /// Name of column `index`.
    ///
    /// # Errors
    ///
    /// `IndexRange` outside `[0, columns())`.
    pub fn column_name(&self, index: u16) -> Result<String, OdbcError> {
        self.with_column(index, |col| col.name.clone())
    }

    /// Native SQL type code of column `index`.
    ///
    /// # Errors
    ///
    /// `IndexRange` outside `[0, columns())`.
    pub fn column_datatype(&self, index: u16) -> Result<i16, OdbcError> {
        self.with_column(index, |col| col.sql_type.0)
    }

    /// 0-indexed position of the column named `name` (exact match).
    ///
    /// # Errors
    ///
    /// `Programming` when no column carries that name.
    pub fn column_index(&self, name: &str) -> Result<u16, OdbcError> {
        let columns = self.inner.columns.borrow();
        columns
            .iter()
            .position(|col| col.name == name)
            .map(|i| i as u16)
            .ok_or_else(|| OdbcError::programming(format!("no column named {name}")))
    }

    /// Declared size of column `index` as the driver reports it.
    ///
    /// # Errors
    ///
    /// `IndexRange` outside `[0, columns())`.
    pub fn column_size(&self, index: u16) -> Result<usize, OdbcError> {
        self.with_column(index, |col| col.sql_size)
    }

    /// Whether the driver declares column `index` nullable.
    ///
    /// # Errors
    ///
    /// `IndexRange` outside `[0, columns())`.
    pub fn column_nullable(&self, index: u16) -> Result<bool, OdbcError> {
        self.with_column(index, |col| col.nullable)
    }

    /// Advance to the next result set of a multi-statement batch, dropping
    /// the current buffers and re-binding for the new column shape.
    ///
    /// # Errors
    ///
    /// `Database` on driver failure.
    pub fn next_result(&self) -> Result<bool, OdbcError> {
        let hstmt = self.inner.stmt.hstmt();
        // SAFETY: hstmt is live; unbinding detaches every buffer pointer
        // before the column Vec is rebuilt.
        let rc = unsafe {
            let rc = SQLFreeStmt(hstmt, FreeStmtOption::Unbind);
            ensure("SQLFreeStmt", rc, hstmt as Handle, HandleType::Stmt)?;
            let rc = SQLMoreResults(hstmt);
            check("SQLMoreResults", rc, hstmt as Handle, HandleType::Stmt)?
        };
        if rc == SqlReturn::NO_DATA {
            self.inner.columns.borrow_mut().clear();
            self.inner.at_end.set(true);
            return Ok(false);
        }
        self.inner.fetched.set(false);
        self.inner.at_end.set(false);
        self.inner.rowset_pos.set(0);
        self.inner.rows_fetched.set(0);
        self.describe_and_bind()?;
        Ok(true)
    }

    /// Raw statement handle behind this cursor.
    ///
    /// Must not be retained past this `ResultSet`'s lifetime.
    #[must_use]
    pub fn stmt_handle(&self) -> Handle {
        self.inner.stmt.stmt_handle()
    }

    fn current_row(&self, index: u16) -> Result<usize, OdbcError> {
        let count = self.columns();
        if index >= count {
            return Err(OdbcError::IndexRange { index, count });
        }
        let row = self.inner.rowset_pos.get();
        if !self.inner.fetched.get() || row >= self.rows() {
            return Err(OdbcError::programming(
                "no current row; advance the cursor first",
            ));
        }
        Ok(row)
    }

    fn indicator(&self, index: u16, row: usize) -> Len {
        self.inner.columns.borrow()[index as usize].indicators[row]
    }

    fn with_column<R>(&self, index: u16, f: impl FnOnce(&BoundColumn) -> R) -> Result<R, OdbcError> {
        let columns = self.inner.columns.borrow();
        columns
            .get(index as usize)
            .map(f)
            .ok_or(OdbcError::IndexRange {
                index,
                count: columns.len() as u16,
            })
    }

    fn numeric_cell(&self, index: u16, row: usize) -> Result<NumericCell, OdbcError> {
        self.with_column(index, |col| match col.ctype {
            CDataType::SLong => Ok(NumericCell::I32(col.read_unaligned::<i32>(row))),
            CDataType::SBigInt => Ok(NumericCell::I64(col.read_unaligned::<i64>(row))),
            CDataType::Double => Ok(NumericCell::F64(col.read_unaligned::<f64>(row))),
            _ => Err(OdbcError::TypeIncompatible {
                column: index,
                ctype: col.ctype as i16,
            }),
        })?
    }
}

impl std::fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("columns", &self.columns())
            .field("rowset_size", &self.inner.rowset_size)
            .field("end", &self.inner.at_end.get())
            .finish_non_exhaustive()
    }
}

impl Drop for ResultInner {
    fn drop(&mut self) {
        if !self.stmt.is_open() {
            return;
        }
        let hstmt = self.stmt.hstmt();
        // SAFETY: hstmt is live; the rows-fetched pointer must be cleared
        // before the cell it targets is freed with this inner.
        unsafe {
            let rc = SQLFreeStmt(hstmt, FreeStmtOption::Unbind);
            if !handle::succeeded(rc) {
                tracing::debug!("SQLFreeStmt(Unbind) failed during drop");
            }
            let rc = SQLSetStmtAttrW(
                hstmt,
                StatementAttribute::RowsFetchedPtr,
                std::ptr::null_mut(),
                0,
            );
            if !handle::succeeded(rc) {
                tracing::debug!("clearing rows-fetched pointer failed during drop");
            }
            let rc = SQLFreeStmt(hstmt, FreeStmtOption::Close);
            if !handle::succeeded(rc) {
                tracing::debug!("SQLFreeStmt(Close) failed during drop");
            }
        }
    }
}

impl BoundColumn {
    fn slot(&self, row: usize) -> &[u8] {
        &self.data[row * self.stride..(row + 1) * self.stride]
    }

    /// Bytes of payload the driver delivered for `row`, capped at the slot
    /// size when the value was truncated or the total length is unknown.
    fn payload_len(&self, row: usize) -> usize {
        let ind = self.indicators[row];
        if ind == NO_TOTAL || ind < 0 {
            self.stride
        } else {
            (ind as usize).min(self.stride)
        }
    }

    fn read_unaligned<T: Copy>(&self, row: usize) -> T {
        debug_assert!(std::mem::size_of::<T>() <= self.stride);
        // SAFETY: every slot is at least size_of::<T>() bytes for the ctype
        // this column was bound with.
        unsafe { std::ptr::read_unaligned(self.slot(row).as_ptr().cast()) }
    }

    fn text(&self, row: usize) -> String {
        match self.ctype {
            CDataType::WChar => {
                let slot = self.slot(row);
                let payload = self.payload_len(row).min(self.stride.saturating_sub(2));
                let units: Vec<u16> = slot[..payload]
                    .chunks_exact(2)
                    .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
                    .take_while(|&unit| unit != 0)
                    .collect();
                crate::wide::from_wide(&units)
            }
            _ => {
                let slot = self.slot(row);
                let payload = self.payload_len(row).min(self.stride.saturating_sub(1));
                let bytes: Vec<u8> = slot[..payload]
                    .iter()
                    .copied()
                    .take_while(|&b| b != 0)
                    .collect();
                String::from_utf8_lossy(&bytes).into_owned()
            }
        }
    }
}

/// Choose the C buffer type and per-row stride for a described column.
fn plan_binding(sql_type: SqlDataType, sql_size: usize) -> (CDataType, usize) {
    match sql_type {
        SqlDataType::EXT_BIT
        | SqlDataType::EXT_TINY_INT
        | SqlDataType::SMALLINT
        | SqlDataType::INTEGER => (CDataType::SLong, 4),
        SqlDataType::EXT_BIG_INT => (CDataType::SBigInt, 8),
        SqlDataType::DOUBLE
        | SqlDataType::FLOAT
        | SqlDataType::DECIMAL
        | SqlDataType::REAL
        | SqlDataType::NUMERIC => (CDataType::Double, 8),
        SqlDataType::DATE => (CDataType::TypeDate, std::mem::size_of::<Date>()),
        SqlDataType::TIMESTAMP | SqlDataType::EXT_TIMESTAMP => {
            (CDataType::TypeTimestamp, std::mem::size_of::<Timestamp>())
        }
        SqlDataType::CHAR
        | SqlDataType::VARCHAR
        | SqlDataType::EXT_W_CHAR
        | SqlDataType::EXT_W_VARCHAR => {
            let chars = if sql_size == 0 { LONG_TEXT_CHARS } else { sql_size };
            (CDataType::WChar, (chars + 1) * 2)
        }
        SqlDataType::EXT_LONG_VARCHAR | SqlDataType::EXT_W_LONG_VARCHAR => {
            (CDataType::WChar, (LONG_TEXT_CHARS + 1) * 2)
        }
        SqlDataType::EXT_BINARY | SqlDataType::EXT_VAR_BINARY => {
            let bytes = if sql_size == 0 { LONG_BINARY_BYTES } else { sql_size };
            (CDataType::Binary, bytes)
        }
        SqlDataType::EXT_LONG_VAR_BINARY => (CDataType::Binary, LONG_BINARY_BYTES),
        _ => (CDataType::WChar, (DEFAULT_TEXT_CHARS + 1) * 2),
    }
}

enum NumericCell {
    I32(i32),
    I64(i64),
    F64(f64),
}

mod sealed {
    pub trait Sealed {}
}

/// Types a result column can be decoded into. A closed set: integral and
/// floating widths, `String`, `Date`, `Timestamp`, and `Vec<u8>`.
pub trait FromColumn: sealed::Sealed + Sized {
    /// Decode the value at (`index`, `row`). Not part of the public contract.
    #[doc(hidden)]
    fn decode(result: &ResultSet, index: u16, row: usize) -> Result<Self, OdbcError>;
}

macro_rules! numeric_from_column {
    ($($rust:ty),+) => {$(
        impl sealed::Sealed for $rust {}
        impl FromColumn for $rust {
            fn decode(result: &ResultSet, index: u16, row: usize) -> Result<Self, OdbcError> {
                // Cross-width numeric casts are permitted; the closed bind
                // set guarantees the source is one of three cell shapes.
                Ok(match result.numeric_cell(index, row)? {
                    NumericCell::I32(v) => v as $rust,
                    NumericCell::I64(v) => v as $rust,
                    NumericCell::F64(v) => v as $rust,
                })
            }
        }
    )+};
}

numeric_from_column!(i16, u16, i32, u32, i64, u64, f32, f64);

impl sealed::Sealed for String {}
impl FromColumn for String {
    fn decode(result: &ResultSet, index: u16, row: usize) -> Result<Self, OdbcError> {
        result.with_column(index, |col| match col.ctype {
            CDataType::WChar | CDataType::Char => Ok(col.text(row)),
            CDataType::SLong => Ok(col.read_unaligned::<i32>(row).to_string()),
            CDataType::SBigInt => Ok(col.read_unaligned::<i64>(row).to_string()),
            CDataType::Double => Ok(col.read_unaligned::<f64>(row).to_string()),
            CDataType::TypeDate => {
                let d = col.read_unaligned::<Date>(row);
                Ok(format!("{:04}-{:02}-{:02}", d.year, d.month, d.day))
            }
            CDataType::TypeTimestamp => {
                let t = col.read_unaligned::<Timestamp>(row);
                Ok(format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                    t.year, t.month, t.day, t.hour, t.minute, t.second
                ))
            }
            _ => Err(OdbcError::TypeIncompatible {
                column: index,
                ctype: col.ctype as i16,
            }),
        })?
    }
}

impl sealed::Sealed for Date {}
impl FromColumn for Date {
    fn decode(result: &ResultSet, index: u16, row: usize) -> Result<Self, OdbcError> {
        result.with_column(index, |col| match col.ctype {
            CDataType::TypeDate => Ok(col.read_unaligned::<Date>(row)),
            CDataType::TypeTimestamp => {
                let t = col.read_unaligned::<Timestamp>(row);
                Ok(Date {
                    year: t.year,
                    month: t.month,
                    day: t.day,
                })
            }
            _ => Err(OdbcError::TypeIncompatible {
                column: index,
                ctype: col.ctype as i16,
            }),
        })?
    }
}

impl sealed::Sealed for Timestamp {}
impl FromColumn for Timestamp {
    fn decode(result: &ResultSet, index: u16, row: usize) -> Result<Self, OdbcError> {
        result.with_column(index, |col| match col.ctype {
            CDataType::TypeTimestamp => Ok(col.read_unaligned::<Timestamp>(row)),
            CDataType::TypeDate => {
                let d = col.read_unaligned::<Date>(row);
                Ok(Timestamp {
                    year: d.year,
                    month: d.month,
                    day: d.day,
                    hour: 0,
                    minute: 0,
                    second: 0,
                    fraction: 0,
                })
            }
            _ => Err(OdbcError::TypeIncompatible {
                column: index,
                ctype: col.ctype as i16,
            }),
        })?
    }
}

impl sealed::Sealed for Vec<u8> {}
impl FromColumn for Vec<u8> {
    fn decode(result: &ResultSet, index: u16, row: usize) -> Result<Self, OdbcError> {
        result.with_column(index, |col| match col.ctype {
            CDataType::Binary => Ok(col.slot(row)[..col.payload_len(row)].to_vec()),
            _ => Err(OdbcError::TypeIncompatible {
                column: index,
                ctype: col.ctype as i16,
            }),
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wide_column(text: &str, chars: usize) -> BoundColumn {
        let stride = (chars + 1) * 2;
        let mut data = vec![0u8; stride];
        for (i, unit) in crate::wide::to_wide(text).as_slice().iter().enumerate() {
            data[i * 2..i * 2 + 2].copy_from_slice(&unit.to_ne_bytes());
        }
        BoundColumn {
            name: "c".into(),
            sql_type: SqlDataType::VARCHAR,
            sql_size: chars,
            nullable: true,
            ctype: CDataType::WChar,
            stride,
            data,
            indicators: vec![(text.len() * 2) as Len],
        }
    }

    #[test]
    fn test_plan_binding_integral_types_widen_to_long() {
        for sql_type in [
            SqlDataType::EXT_BIT,
            SqlDataType::EXT_TINY_INT,
            SqlDataType::SMALLINT,
            SqlDataType::INTEGER,
        ] {
            assert_eq!(plan_binding(sql_type, 0), (CDataType::SLong, 4));
        }
        assert_eq!(plan_binding(SqlDataType::EXT_BIG_INT, 0), (CDataType::SBigInt, 8));
    }

    #[test]
    fn test_plan_binding_decimals_widen_to_double() {
        for sql_type in [
            SqlDataType::DOUBLE,
            SqlDataType::FLOAT,
            SqlDataType::DECIMAL,
            SqlDataType::REAL,
            SqlDataType::NUMERIC,
        ] {
            assert_eq!(plan_binding(sql_type, 10), (CDataType::Double, 8));
        }
    }

    #[test]
    fn test_plan_binding_text_reserves_terminator() {
        assert_eq!(plan_binding(SqlDataType::VARCHAR, 10), (CDataType::WChar, 22));
        // Unknown declared size falls back to the long-text cap.
        assert_eq!(
            plan_binding(SqlDataType::VARCHAR, 0),
            (CDataType::WChar, (LONG_TEXT_CHARS + 1) * 2)
        );
    }

    #[test]
    fn test_plan_binding_unknown_type_falls_back_to_text() {
        assert_eq!(
            plan_binding(SqlDataType::EXT_GUID, 36),
            (CDataType::WChar, (DEFAULT_TEXT_CHARS + 1) * 2)
        );
    }

    #[test]
    fn test_wide_text_extraction_stops_at_terminator() {
        let col = wide_column("two", 16);
        assert_eq!(col.text(0), "two");
    }

    #[test]
    fn test_truncated_indicator_is_capped_at_slot() {
        let mut col = wide_column("abcdef", 6);
        // Driver reports the full value length even when it truncated.
        col.indicators[0] = 1000;
        assert_eq!(col.text(0), "abcdef");
    }

    #[test]
    fn test_numeric_slot_read() {
        let mut data = vec![0u8; 4];
        data.copy_from_slice(&42i32.to_ne_bytes());
        let col = BoundColumn {
            name: "n".into(),
            sql_type: SqlDataType::INTEGER,
            sql_size: 10,
            nullable: false,
            ctype: CDataType::SLong,
            stride: 4,
            data,
            indicators: vec![4],
        };
        assert_eq!(col.read_unaligned::<i32>(0), 42);
    }
}
