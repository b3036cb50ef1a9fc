use std::str::FromStr;

use mynt_io::{Reader, Writer};
use tokio::io::{AsyncRead, AsyncWrite};

/// A typed value written with `send`, or decoded by `--expect`.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    Skip(usize),
}

/// What to decode next from a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expect {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Bytes(usize),
    Skip(usize),
}

fn parse_number<T: FromStr>(kind: &str, literal: &str) -> Result<T, String> {
    literal
        .trim()
        .parse()
        .map_err(|_| format!("invalid {kind} value: {literal:?}"))
}

impl FromStr for Value {
    type Err = String;

    /// Parse `kind:literal`, e.g. `int:42`, `bytes:hello`, `skip:4`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (kind, literal) = input
            .split_once(':')
            .ok_or_else(|| format!("expected KIND:VALUE, got {input:?}"))?;
        match kind {
            "byte" => parse_number(kind, literal).map(Value::Byte),
            "short" => parse_number(kind, literal).map(Value::Short),
            "int" => parse_number(kind, literal).map(Value::Int),
            "long" => parse_number(kind, literal).map(Value::Long),
            "float" => parse_number(kind, literal).map(Value::Float),
            "double" => parse_number(kind, literal).map(Value::Double),
            "bytes" => Ok(Value::Bytes(literal.as_bytes().to_vec())),
            "skip" => parse_number(kind, literal).map(Value::Skip),
            other => Err(format!("unknown value kind: {other}")),
        }
    }
}

impl FromStr for Expect {
    type Err = String;

    /// Parse `int`, `double`, `bytes:N`, `skip:N`, ...
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.split_once(':') {
            None => match input {
                "byte" => Ok(Expect::Byte),
                "short" => Ok(Expect::Short),
                "int" => Ok(Expect::Int),
                "long" => Ok(Expect::Long),
                "float" => Ok(Expect::Float),
                "double" => Ok(Expect::Double),
                "bytes" | "skip" => Err(format!("{input} needs a length, e.g. {input}:8")),
                other => Err(format!("unknown value kind: {other}")),
            },
            Some(("bytes", len)) => parse_number("bytes length", len).map(Expect::Bytes),
            Some(("skip", len)) => parse_number("skip length", len).map(Expect::Skip),
            Some((other, _)) => Err(format!("{other} takes no length")),
        }
    }
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Byte(_) => "byte",
            Value::Short(_) => "short",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Bytes(_) => "bytes",
            Value::Skip(_) => "skip",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Byte(v) => serde_json::json!(v),
            Value::Short(v) => serde_json::json!(v),
            Value::Int(v) => serde_json::json!(v),
            Value::Long(v) => serde_json::json!(v),
            Value::Float(v) => serde_json::json!(v),
            Value::Double(v) => serde_json::json!(v),
            Value::Bytes(bytes) => serde_json::json!(payload_preview(bytes)),
            Value::Skip(n) => serde_json::json!(n),
        }
    }

    pub fn display(&self) -> String {
        match self {
            Value::Byte(v) => v.to_string(),
            Value::Short(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Long(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Double(v) => v.to_string(),
            Value::Bytes(bytes) => payload_preview(bytes),
            Value::Skip(n) => format!("<{n} bytes skipped>"),
        }
    }
}

pub fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

pub async fn write_value<W>(writer: &Writer<W>, value: &Value) -> mynt_io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match value {
        Value::Byte(v) => writer.byte(*v).await,
        Value::Short(v) => writer.short(*v).await,
        Value::Int(v) => writer.int(*v).await,
        Value::Long(v) => writer.long(*v).await,
        Value::Float(v) => writer.float(*v).await,
        Value::Double(v) => writer.double(*v).await,
        Value::Bytes(bytes) => writer.write_all(bytes).await.map(|_| ()),
        Value::Skip(n) => writer.skip(*n).await,
    }
}

pub async fn read_value<R>(reader: &Reader<R>, expect: Expect) -> mynt_io::Result<Value>
where
    R: AsyncRead + Unpin,
{
    Ok(match expect {
        Expect::Byte => Value::Byte(reader.byte().await?),
        Expect::Short => Value::Short(reader.short().await?),
        Expect::Int => Value::Int(reader.int().await?),
        Expect::Long => Value::Long(reader.long().await?),
        Expect::Float => Value::Float(reader.float().await?),
        Expect::Double => Value::Double(reader.double().await?),
        Expect::Bytes(n) => Value::Bytes(reader.bytes_vec(n).await?),
        Expect::Skip(n) => {
            reader.skip(n).await?;
            Value::Skip(n)
        }
    })
}

/// Decode one value per entry of `expect`, in order.
pub async fn read_values<R>(reader: &Reader<R>, expect: &[Expect]) -> mynt_io::Result<Vec<Value>>
where
    R: AsyncRead + Unpin,
{
    let mut values = Vec::with_capacity(expect.len());
    for kind in expect {
        values.push(read_value(reader, *kind).await?);
    }
    Ok(values)
}
