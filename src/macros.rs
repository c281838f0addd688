/// Returns early with an `Error::Internal` built from a message or a format string.
macro_rules! fail {
    ($err:expr) => (
        return Err(From::from($err))
    );
    ($fmt:expr, $($arg:tt)*) => (
        return Err(From::from(format!($fmt, $($arg)*)))
    );
}

/// Fails with the given message unless the condition holds.
macro_rules! ensure {
    ($expr:expr, $err:expr) => (
        if !($expr) {
            fail!($err);
        }
    );
    ($expr: expr, $fmt:expr, $($arg:tt)*) => (
        if !($expr) {
            fail!(format!($fmt, $($arg)*));
        }
    );
}

/// Returns early with `Error::InvalidPartition`.
macro_rules! bad_partition {
    ($fmt:expr) => (
        return Err($crate::error::Error::InvalidPartition(format!($fmt)))
    );
    ($fmt:expr, $($arg:tt)*) => (
        return Err($crate::error::Error::InvalidPartition(format!($fmt, $($arg)*)))
    );
}

#[cfg(test)]
macro_rules! assert_err {
    ($expr:expr, $err:expr) => {
        match $expr {
            Ok(_) => {
                panic!("assertion failed: not an error in `{}`", stringify!($expr));
            }
            Err(ref value) => {
                let desc = value.to_string();
                if !desc.contains($err) {
                    panic!(
                        "assertion failed: error message `{}` doesn't contain `{}` in `{}`",
                        desc,
                        $err,
                        stringify!($expr)
                    );
                }
            }
        }
    };
}
