//! The `math` channel served by `surfacewire serve`.

use surfacewire_host::Library;
use surfacewire_types::Payload;

pub const MATH_CHANNEL: &str = "math";

/// `add(a, b)`, `mul(a, b)`, `echo(x)` and `bytes(s)`, the last returning the
/// UTF-8 bytes of `s` as a binary payload.
pub fn math_library() -> Library {
    Library::builder()
        .json_function("add", |(a, b): (f64, f64)| async move { Ok(a + b) })
        .json_function("mul", |(a, b): (f64, f64)| async move { Ok(a * b) })
        .function("echo", |args: Vec<Payload>| async move {
            Ok(args.into_iter().next())
        })
        .function("bytes", |args: Vec<Payload>| async move {
            let text = args
                .first()
                .and_then(Payload::as_str)
                .ok_or_else(|| "bytes expects one string argument".to_string())?;
            Ok(Some(Payload::Binary(text.as_bytes().to_vec())))
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(function: &str, args: Vec<Payload>) -> Result<Option<Payload>, String> {
        let f = math_library().resolve(function).unwrap();
        tokio_test::block_on(f(args))
    }

    #[test]
    fn test_math_functions() {
        assert_eq!(
            call("add", vec![Payload::from(2i64), Payload::from(3i64)]).unwrap(),
            Some(Payload::Json(json!(5.0)))
        );
        assert_eq!(
            call("mul", vec![Payload::from(4i64), Payload::from(2.5)]).unwrap(),
            Some(Payload::Json(json!(10.0)))
        );
        assert_eq!(
            call("echo", vec![Payload::from("x")]).unwrap(),
            Some(Payload::from("x"))
        );
        assert_eq!(
            call("bytes", vec![Payload::from("hi")]).unwrap(),
            Some(Payload::Binary(b"hi".to_vec()))
        );
    }

    #[test]
    fn test_bytes_rejects_non_string() {
        let err = call("bytes", vec![Payload::from(1i64)]).unwrap_err();
        assert!(err.contains("string"));
    }

    #[test]
    fn test_listing() {
        assert_eq!(
            math_library().functions().unwrap(),
            vec!["add", "bytes", "echo", "mul"]
        );
    }
}
