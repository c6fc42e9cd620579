//! Mapping between Rust value types and ODBC C/SQL type codes.

use odbc_sys::{CDataType, ParamType, SqlDataType};

pub use odbc_sys::{Date, Time, Timestamp};

/// Direction of a bound statement parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDirection {
    /// Value flows into the statement.
    In,
    /// Value is written back by the statement.
    Out,
    /// Value flows both ways.
    InOut,
    /// Return value of a callable statement.
    Return,
}

impl ParamDirection {
    pub(crate) fn to_param_type(self) -> ParamType {
        match self {
            Self::In => ParamType::Input,
            Self::Out | Self::Return => ParamType::Output,
            Self::InOut => ParamType::InputOutput,
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Fixed-size value types that can back a bound parameter buffer.
///
/// The driver reads and writes the caller's buffer directly, so only types
/// with a stable C layout understood by ODBC qualify.
pub trait ParamElement: sealed::Sealed + Copy + 'static {
    /// C buffer type code passed to the driver.
    #[must_use]
    fn c_data_type() -> CDataType;
    /// SQL type code advertised for the parameter.
    #[must_use]
    fn sql_data_type() -> SqlDataType;
    /// Column size reported when the driver cannot describe the parameter.
    #[must_use]
    fn column_size() -> usize {
        std::mem::size_of::<Self>()
    }
}

macro_rules! param_element {
    ($rust:ty, $ctype:expr, $sqltype:expr) => {
        impl sealed::Sealed for $rust {}
        impl ParamElement for $rust {
            fn c_data_type() -> CDataType {
                $ctype
            }
            fn sql_data_type() -> SqlDataType {
                $sqltype
            }
        }
    };
}

param_element!(i16, CDataType::SShort, SqlDataType::SMALLINT);
param_element!(u16, CDataType::UShort, SqlDataType::SMALLINT);
param_element!(i32, CDataType::SLong, SqlDataType::INTEGER);
param_element!(u32, CDataType::ULong, SqlDataType::INTEGER);
param_element!(i64, CDataType::SBigInt, SqlDataType::EXT_BIG_INT);
param_element!(u64, CDataType::UBigInt, SqlDataType::EXT_BIG_INT);
param_element!(f32, CDataType::Float, SqlDataType::REAL);
param_element!(f64, CDataType::Double, SqlDataType::DOUBLE);
param_element!(Date, CDataType::TypeDate, SqlDataType::DATE);
param_element!(Time, CDataType::TypeTime, SqlDataType::TIME);
param_element!(Timestamp, CDataType::TypeTimestamp, SqlDataType::TIMESTAMP);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_mapping() {
        assert_eq!(ParamDirection::In.to_param_type(), ParamType::Input);
        assert_eq!(ParamDirection::Out.to_param_type(), ParamType::Output);
        assert_eq!(ParamDirection::Return.to_param_type(), ParamType::Output);
        assert_eq!(
            ParamDirection::InOut.to_param_type(),
            ParamType::InputOutput
        );
    }

    #[test]
    fn test_integer_type_codes() {
        assert_eq!(<i32 as ParamElement>::c_data_type(), CDataType::SLong);
        assert_eq!(<i64 as ParamElement>::sql_data_type(), SqlDataType::EXT_BIG_INT);
        assert_eq!(<i64 as ParamElement>::column_size(), 8);
    }

    #[test]
    fn test_temporal_type_codes() {
        assert_eq!(<Date as ParamElement>::c_data_type(), CDataType::TypeDate);
        assert_eq!(
            <Timestamp as ParamElement>::sql_data_type(),
            SqlDataType::TIMESTAMP
        );
    }
}
