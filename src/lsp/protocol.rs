use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Location {
    pub uri: String,
    pub range: Range,
}

/// `textDocument/definition` may answer with a location link instead of a
/// plain location; only the target fields matter to us.
#[derive(Deserialize, Clone, Debug)]
pub struct LocationLink {
    #[serde(rename = "targetUri")]
    pub target_uri: String,
    #[serde(rename = "targetSelectionRange")]
    pub target_selection_range: Range,
}

/// The three shapes a definition response can take. An explicit match on
/// every case lives in the client; empty/unmatched collapses to "not found".
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum DefinitionResponse {
    Single(Location),
    Many(Vec<Location>),
    Links(Vec<LocationLink>),
}

#[derive(Serialize)]
pub struct TextDocumentIdentifier {
    pub uri: String,
}

#[derive(Serialize)]
pub struct TextDocumentPositionParams {
    #[serde(rename = "textDocument")]
    pub text_document: TextDocumentIdentifier,
    pub position: Position,
}

#[derive(Serialize)]
pub struct GotoDefinitionParams {
    #[serde(flatten)]
    pub text_document_position_params: TextDocumentPositionParams,
}

#[derive(Serialize)]
pub struct HoverRequestParams {
    #[serde(flatten)]
    pub text_document_position_params: TextDocumentPositionParams,
}

#[derive(Serialize)]
pub struct WorkspaceSymbolParams {
    pub query: String,
}

#[derive(Serialize, Deserialize)]
pub struct LspRequest {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    pub method: String,
    pub params: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
pub struct LspResponse {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<LspError>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LspError {
    pub code: i32,
    pub message: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct Hover {
    pub contents: HoverContents,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum HoverContents {
    Markup(MarkupContent),
    Scalar(String),
    MarkedString(MarkedString),
    Array(Vec<MarkedStringOrString>),
}

#[derive(Deserialize, Clone, Debug)]
pub struct MarkupContent {
    pub kind: String,
    pub value: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct MarkedString {
    pub language: Option<String>,
    pub value: String,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum MarkedStringOrString {
    MarkedString(MarkedString),
    String(String),
}

impl HoverContents {
    /// Flatten any of the hover content shapes into one markdown string.
    pub fn as_text(&self) -> String {
        match self {
            Self::Scalar(s) => s.clone(),
            Self::Markup(markup) => markup.value.clone(),
            Self::MarkedString(ms) => ms.value.clone(),
            Self::Array(arr) => arr
                .iter()
                .map(|item| match item {
                    MarkedStringOrString::String(s) => s.clone(),
                    MarkedStringOrString::MarkedString(ms) => ms.value.clone(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Numeric LSP symbol kinds, with labels for display.
#[derive(Serialize_repr, Deserialize_repr, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SymbolKind {
    File = 1,
    Module = 2,
    Namespace = 3,
    Package = 4,
    Class = 5,
    Method = 6,
    Property = 7,
    Field = 8,
    Constructor = 9,
    Enum = 10,
    Interface = 11,
    Function = 12,
    Variable = 13,
    Constant = 14,
    String = 15,
    Number = 16,
    Boolean = 17,
    Array = 18,
    Object = 19,
    Key = 20,
    Null = 21,
    EnumMember = 22,
    Struct = 23,
    Event = 24,
    Operator = 25,
    TypeParameter = 26,
}

impl SymbolKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Module => "module",
            Self::Namespace => "namespace",
            Self::Package => "package",
            Self::Class => "class",
            Self::Method => "method",
            Self::Property => "property",
            Self::Field => "field",
            Self::Constructor => "initializer",
            Self::Enum => "enum",
            Self::Interface => "protocol",
            Self::Function => "function",
            Self::Variable => "variable",
            Self::Constant => "constant",
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Key => "key",
            Self::Null => "null",
            Self::EnumMember => "case",
            Self::Struct => "struct",
            Self::Event => "event",
            Self::Operator => "operator",
            Self::TypeParameter => "type parameter",
        }
    }
}

/// Flat `workspace/symbol` result item (SymbolInformation).
#[derive(Deserialize, Clone, Debug)]
pub struct SymbolInformation {
    pub name: String,
    pub kind: SymbolKind,
    pub location: Location,
    #[serde(rename = "containerName")]
    pub container_name: Option<String>,
}

/// Richer `workspace/symbol` result item (WorkspaceSymbol) whose location is
/// either a full location or a bare document reference.
#[derive(Deserialize, Clone, Debug)]
pub struct WorkspaceSymbol {
    pub name: String,
    pub kind: SymbolKind,
    #[serde(rename = "containerName")]
    pub container_name: Option<String>,
    pub location: WorkspaceSymbolLocation,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum WorkspaceSymbolLocation {
    Full(Location),
    Document { uri: String },
}

/// The two shapes a `workspace/symbol` response can take.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum WorkspaceSymbolResponse {
    Flat(Vec<SymbolInformation>),
    Rich(Vec<WorkspaceSymbol>),
}

/// One workspace-symbol hit, normalized from either response shape.
#[derive(Clone, Debug)]
pub struct SymbolMatch {
    pub name: String,
    pub kind: SymbolKind,
    pub container_name: Option<String>,
    pub uri: String,
    /// Absent when the server only returned a document reference.
    pub range: Option<Range>,
}

impl WorkspaceSymbolResponse {
    /// Flatten both response shapes into one result shape.
    pub fn into_matches(self) -> Vec<SymbolMatch> {
        match self {
            Self::Flat(items) => items
                .into_iter()
                .map(|s| SymbolMatch {
                    name: s.name,
                    kind: s.kind,
                    container_name: s.container_name,
                    uri: s.location.uri,
                    range: Some(s.location.range),
                })
                .collect(),
            Self::Rich(items) => items
                .into_iter()
                .map(|s| {
                    let (uri, range) = match s.location {
                        WorkspaceSymbolLocation::Full(loc) => (loc.uri, Some(loc.range)),
                        WorkspaceSymbolLocation::Document { uri } => (uri, None),
                    };
                    SymbolMatch {
                        name: s.name,
                        kind: s.kind,
                        container_name: s.container_name,
                        uri,
                        range,
                    }
                })
                .collect(),
        }
    }
}
