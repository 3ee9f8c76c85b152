//! Legacy XML-RPC search endpoint, as queried by `pip search`.
//!
//! Only the `search(query, operator)` method is served. Requests are decoded
//! into a small [`Value`] tree with `quick-xml`; replies and faults are
//! written back the same way. Faults travel with HTTP 200, as the protocol
//! requires.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use pail_catalog::{search, SearchHit, SearchQuery};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::{debug, error, warn};

use crate::AppState;

/// A decoded XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    Double(f64),
    Nil,
    Array(Vec<Value>),
    Struct(Vec<(String, Value)>),
}

impl Value {
    /// Member of a struct, matching the key without regard to ASCII case.
    pub fn member(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Struct(members) => members
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<&SearchHit> for Value {
    fn from(hit: &SearchHit) -> Self {
        Value::Struct(vec![
            ("name".to_string(), Value::String(hit.name.clone())),
            ("summary".to_string(), Value::String(hit.summary.clone())),
            ("version".to_string(), Value::String(hit.version.clone())),
            ("_pypi_ordering".to_string(), Value::Bool(hit.ordering)),
        ])
    }
}

/// A decoded `methodCall`.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method: String,
    pub params: Vec<Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum XmlRpcError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("cannot encode response: {0}")]
    Encode(String),
}

impl XmlRpcError {
    /// Fault code, following the common XML-RPC server error conventions.
    pub fn fault_code(&self) -> i64 {
        match self {
            XmlRpcError::Malformed(_) => -32700,
            XmlRpcError::UnknownMethod(_) => -32601,
            XmlRpcError::InvalidParams(_) => -32602,
            XmlRpcError::Encode(_) => -32603,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open(String),
    Close(String),
    Text(String),
}

fn element_name(raw: &[u8]) -> Result<String, XmlRpcError> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| XmlRpcError::Malformed(format!("element name is not UTF-8: {e}")))
}

fn push_text(tokens: &mut Vec<Token>, text: String) {
    if let Some(Token::Text(previous)) = tokens.last_mut() {
        previous.push_str(&text);
    } else {
        tokens.push(Token::Text(text));
    }
}

fn tokenize(xml: &str) -> Result<Vec<Token>, XmlRpcError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut tokens = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                tokens.push(Token::Open(element_name(e.local_name().as_ref())?));
            }
            Ok(Event::Empty(e)) => {
                let name = element_name(e.local_name().as_ref())?;
                tokens.push(Token::Open(name.clone()));
                tokens.push(Token::Close(name));
            }
            Ok(Event::End(e)) => {
                tokens.push(Token::Close(element_name(e.local_name().as_ref())?));
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| XmlRpcError::Malformed(e.to_string()))?;
                push_text(&mut tokens, text.into_owned());
            }
            Ok(Event::CData(e)) => {
                push_text(&mut tokens, String::from_utf8_lossy(&e).into_owned());
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(XmlRpcError::Malformed(format!(
                    "at position {}: {e}",
                    reader.buffer_position()
                )))
            }
        }
    }
    Ok(tokens)
}

/// Deepest nesting of arrays and structs accepted in a request.
pub const MAX_VALUE_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek_open(&self, name: &str) -> bool {
        matches!(self.peek(), Some(Token::Open(n)) if n == name)
    }

    fn expect_open(&mut self, name: &str) -> Result<(), XmlRpcError> {
        match self.next() {
            Some(Token::Open(n)) if n == name => Ok(()),
            other => Err(unexpected(&format!("<{name}>"), other)),
        }
    }

    fn expect_close(&mut self, name: &str) -> Result<(), XmlRpcError> {
        match self.next() {
            Some(Token::Close(n)) if n == name => Ok(()),
            other => Err(unexpected(&format!("</{name}>"), other)),
        }
    }

    /// Text content, empty when the element has none.
    fn text(&mut self) -> String {
        if let Some(Token::Text(text)) = self.peek() {
            let text = text.clone();
            self.pos += 1;
            text
        } else {
            String::new()
        }
    }

    /// `<tag>text</tag>`, returning the text.
    fn scalar(&mut self, tag: &str) -> Result<String, XmlRpcError> {
        let text = self.text();
        self.expect_close(tag)?;
        Ok(text)
    }

    fn method_call(&mut self) -> Result<MethodCall, XmlRpcError> {
        self.expect_open("methodCall")?;
        self.expect_open("methodName")?;
        let method = self.scalar("methodName")?.trim().to_string();

        let mut params = Vec::new();
        if self.peek_open("params") {
            self.expect_open("params")?;
            while self.peek_open("param") {
                self.expect_open("param")?;
                params.push(self.value()?);
                self.expect_close("param")?;
            }
            self.expect_close("params")?;
        }
        self.expect_close("methodCall")?;

        if let Some(token) = self.peek() {
            return Err(unexpected("end of document", Some(token.clone())));
        }
        Ok(MethodCall { method, params })
    }

    fn value(&mut self) -> Result<Value, XmlRpcError> {
        if self.depth >= MAX_VALUE_DEPTH {
            return Err(XmlRpcError::Malformed(format!(
                "values nested deeper than {MAX_VALUE_DEPTH} levels"
            )));
        }
        self.depth += 1;
        let value = self.nested_value();
        self.depth -= 1;
        value
    }

    fn nested_value(&mut self) -> Result<Value, XmlRpcError> {
        self.expect_open("value")?;
        let value = match self.next() {
            // Untyped values are strings.
            Some(Token::Close(n)) if n == "value" => return Ok(Value::String(String::new())),
            Some(Token::Text(text)) => Value::String(text),
            Some(Token::Open(tag)) => match tag.as_str() {
                "string" => Value::String(self.scalar("string")?),
                "int" | "i4" | "i8" => {
                    let raw = self.scalar(&tag)?;
                    Value::Int(raw.trim().parse().map_err(|_| {
                        XmlRpcError::Malformed(format!("invalid integer: {raw}"))
                    })?)
                }
                "boolean" => match self.scalar("boolean")?.trim() {
                    "1" | "true" => Value::Bool(true),
                    "0" | "false" => Value::Bool(false),
                    raw => return Err(XmlRpcError::Malformed(format!("invalid boolean: {raw}"))),
                },
                "double" => {
                    let raw = self.scalar("double")?;
                    Value::Double(raw.trim().parse().map_err(|_| {
                        XmlRpcError::Malformed(format!("invalid double: {raw}"))
                    })?)
                }
                "nil" => {
                    self.expect_close("nil")?;
                    Value::Nil
                }
                "array" => {
                    self.expect_open("data")?;
                    let mut items = Vec::new();
                    while self.peek_open("value") {
                        items.push(self.value()?);
                    }
                    self.expect_close("data")?;
                    self.expect_close("array")?;
                    Value::Array(items)
                }
                "struct" => {
                    let mut members = Vec::new();
                    while self.peek_open("member") {
                        self.expect_open("member")?;
                        self.expect_open("name")?;
                        let name = self.scalar("name")?;
                        let value = self.value()?;
                        self.expect_close("member")?;
                        members.push((name, value));
                    }
                    self.expect_close("struct")?;
                    Value::Struct(members)
                }
                other => {
                    return Err(XmlRpcError::Malformed(format!(
                        "unsupported value type <{other}>"
                    )))
                }
            },
            other => return Err(unexpected("a value", other)),
        };
        self.expect_close("value")?;
        Ok(value)
    }
}

fn unexpected(expected: &str, found: Option<Token>) -> XmlRpcError {
    let found = match found {
        Some(Token::Open(n)) => format!("<{n}>"),
        Some(Token::Close(n)) => format!("</{n}>"),
        Some(Token::Text(t)) => format!("text {t:?}"),
        None => "end of document".to_string(),
    };
    XmlRpcError::Malformed(format!("expected {expected}, found {found}"))
}

/// Decode a `methodCall` document.
pub fn parse_method_call(xml: &str) -> Result<MethodCall, XmlRpcError> {
    Parser {
        tokens: tokenize(xml)?,
        pos: 0,
        depth: 0,
    }
    .method_call()
}

fn string_terms(value: Option<&Value>, field: &str) -> Result<Vec<String>, XmlRpcError> {
    match value {
        None | Some(Value::Nil) => Ok(Vec::new()),
        Some(Value::String(term)) => Ok(vec![term.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(term) => Ok(term.clone()),
                other => Err(XmlRpcError::InvalidParams(format!(
                    "{field} terms must be strings, got {other:?}"
                ))),
            })
            .collect(),
        Some(other) => Err(XmlRpcError::InvalidParams(format!(
            "{field} must be a string or an array of strings, got {other:?}"
        ))),
    }
}

/// Build a search query from the `search(query, operator)` parameters.
pub fn search_query(params: &[Value]) -> Result<SearchQuery, XmlRpcError> {
    let query = match params.first() {
        Some(query @ Value::Struct(_)) => query,
        Some(other) => {
            return Err(XmlRpcError::InvalidParams(format!(
                "search query must be a struct, got {other:?}"
            )))
        }
        None => {
            return Err(XmlRpcError::InvalidParams(
                "search requires a query struct".to_string(),
            ))
        }
    };
    let operator = match params.get(1) {
        Some(Value::String(op)) => op.clone(),
        _ => String::new(),
    };
    Ok(SearchQuery {
        name_terms: string_terms(query.member("name"), "name")?,
        summary_terms: string_terms(query.member("summary"), "summary")?,
        operator,
    })
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), XmlRpcError> {
    writer
        .write_event(event)
        .map_err(|e| XmlRpcError::Encode(e.to_string()))
}

fn open(writer: &mut Writer<Vec<u8>>, tag: &str) -> Result<(), XmlRpcError> {
    write(writer, Event::Start(BytesStart::new(tag)))
}

fn close(writer: &mut Writer<Vec<u8>>, tag: &str) -> Result<(), XmlRpcError> {
    write(writer, Event::End(BytesEnd::new(tag)))
}

fn text_element(writer: &mut Writer<Vec<u8>>, tag: &str, text: &str) -> Result<(), XmlRpcError> {
    open(writer, tag)?;
    write(writer, Event::Text(BytesText::new(text)))?;
    close(writer, tag)
}

fn write_value(writer: &mut Writer<Vec<u8>>, value: &Value) -> Result<(), XmlRpcError> {
    open(writer, "value")?;
    match value {
        Value::String(s) => text_element(writer, "string", s)?,
        Value::Int(i) => text_element(writer, "int", &i.to_string())?,
        Value::Bool(b) => text_element(writer, "boolean", if *b { "1" } else { "0" })?,
        Value::Double(d) => text_element(writer, "double", &d.to_string())?,
        Value::Nil => write(writer, Event::Empty(BytesStart::new("nil")))?,
        Value::Array(items) => {
            open(writer, "array")?;
            open(writer, "data")?;
            for item in items {
                write_value(writer, item)?;
            }
            close(writer, "data")?;
            close(writer, "array")?;
        }
        Value::Struct(members) => {
            open(writer, "struct")?;
            for (name, member) in members {
                open(writer, "member")?;
                text_element(writer, "name", name)?;
                write_value(writer, member)?;
                close(writer, "member")?;
            }
            close(writer, "struct")?;
        }
    }
    close(writer, "value")
}

fn document(
    body: impl FnOnce(&mut Writer<Vec<u8>>) -> Result<(), XmlRpcError>,
) -> Result<String, XmlRpcError> {
    let mut writer = Writer::new(Vec::new());
    write(&mut writer, Event::Decl(BytesDecl::new("1.0", None, None)))?;
    open(&mut writer, "methodResponse")?;
    body(&mut writer)?;
    close(&mut writer, "methodResponse")?;
    String::from_utf8(writer.into_inner()).map_err(|e| XmlRpcError::Encode(e.to_string()))
}

/// Encode a successful `methodResponse` carrying one value.
pub fn encode_response(value: &Value) -> Result<String, XmlRpcError> {
    document(|writer| {
        open(writer, "params")?;
        open(writer, "param")?;
        write_value(writer, value)?;
        close(writer, "param")?;
        close(writer, "params")
    })
}

/// Encode a fault `methodResponse`.
pub fn encode_fault(code: i64, message: &str) -> Result<String, XmlRpcError> {
    let fault = Value::Struct(vec![
        ("faultCode".to_string(), Value::Int(code)),
        ("faultString".to_string(), Value::String(message.to_string())),
    ]);
    document(|writer| {
        open(writer, "fault")?;
        write_value(writer, &fault)?;
        close(writer, "fault")
    })
}

/// Decode a call, run it against `catalog` and encode the reply.
pub fn dispatch(catalog: &pail_catalog::Catalog, xml: &str) -> Result<String, XmlRpcError> {
    let call = parse_method_call(xml)?;
    debug!(method = %call.method, params = call.params.len(), "XML-RPC call");
    match call.method.as_str() {
        "search" => {
            let query = search_query(&call.params)?;
            let hits = search(catalog, &query);
            debug!(hits = hits.len(), "Search finished");
            encode_response(&Value::Array(hits.iter().map(Value::from).collect()))
        }
        other => Err(XmlRpcError::UnknownMethod(other.to_string())),
    }
}

fn xml_response(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "text/xml")], body).into_response()
}

/// `POST /pypi` and `POST /RPC2`.
pub async fn handle(State(state): State<AppState>, body: String) -> Response {
    let catalog = state.catalog.snapshot();
    let fault = match dispatch(&catalog, &body) {
        Ok(reply) => return xml_response(StatusCode::OK, reply),
        Err(e) => e,
    };

    warn!(error = %fault, "XML-RPC fault");
    match encode_fault(fault.fault_code(), &fault.to_string()) {
        Ok(reply) => xml_response(StatusCode::OK, reply),
        Err(e) => {
            error!(error = %e, "Cannot encode XML-RPC fault");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
