//! Kotlin language definition

use super::{ChunkType, LanguageDef, SignatureStyle};

/// Tree-sitter query for extracting Kotlin code chunks.
///
/// The kotlin-ng grammar uses `class_declaration` for both classes and interfaces,
/// distinguished by an anonymous keyword child ("class" vs "interface").
/// Enum classes have a `class_modifier` with text "enum" inside `modifiers`.
/// The `post_process_chunk` hook reclassifies these after extraction.
const CHUNK_QUERY: &str = r#"
;; Classes (regular, data, sealed, abstract) and interfaces
;; post_process_chunk reclassifies interfaces and enum classes
(class_declaration
  (identifier) @name) @class

;; Object declarations (singletons)
(object_declaration
  (identifier) @name) @object

;; Functions
(function_declaration
  (identifier) @name) @function

;; Property declarations (val/var)
(property_declaration
  (variable_declaration
    (identifier) @name)) @property

;; Type aliases
(type_alias
  (identifier) @name) @typealias
"#;

/// Tree-sitter query for extracting Kotlin function calls
const CALL_QUERY: &str = r#"
;; Direct function calls
(call_expression
  (identifier) @callee)

;; Method calls (object.method())
(call_expression
  (navigation_expression
    (identifier) @callee))
"#;

/// Tree-sitter query for extracting Kotlin type references
const TYPE_QUERY: &str = r#"
;; Parameter types
(parameter
  (user_type (identifier) @param_type))

;; Return types
(function_declaration
  (user_type (identifier) @return_type))

;; Property types
(property_declaration
  (user_type (identifier) @field_type))

;; Superclass / interface implementations
(delegation_specifier
  (user_type (identifier) @impl_type))

;; Type alias right-hand side
(type_alias
  (user_type (identifier) @alias_type))

;; Generic type arguments
(type_arguments
  (type_projection
    (user_type (identifier) @type_ref)))

;; Catch-all
(user_type (identifier) @type_ref)
"#;

/// Doc comment node types
const DOC_NODES: &[&str] = &["line_comment", "multiline_comment"];

const STOPWORDS: &[&str] = &[
    "fun", "val", "var", "class", "interface", "object", "companion", "data", "sealed", "enum",
    "abstract", "open", "override", "private", "protected", "public", "internal", "return", "if",
    "else", "when", "for", "while", "do", "break", "continue", "this", "super", "import",
    "package", "is", "as", "in", "null", "true", "false", "typealias", "const", "lateinit",
    "suspend", "inline", "reified",
];

const COMMON_TYPES: &[&str] = &[
    "String", "Int", "Long", "Double", "Float", "Boolean", "Byte", "Short", "Char", "Unit",
    "Nothing", "Any", "List", "ArrayList", "Map", "HashMap", "Set", "HashSet", "Collection",
    "MutableList", "MutableMap", "MutableSet", "Sequence", "Array", "Pair", "Triple", "Comparable",
    "Iterable",
];

/// Post-process Kotlin chunks to reclassify `class_declaration` nodes.
///
/// The kotlin-ng grammar uses `class_declaration` for both classes and interfaces.
/// This hook checks:
/// 1. If an anonymous "interface" keyword child exists -> Interface
/// 2. If `modifiers` contains a `class_modifier` with text "enum" -> Enum
fn post_process_kotlin(
    _name: &mut String,
    chunk_type: &mut ChunkType,
    node: tree_sitter::Node,
    source: &str,
) -> bool {
    // Only reclassify class_declarations
    if node.kind() != "class_declaration" {
        return true;
    }

    let mut has_enum_modifier = false;
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "modifiers" => {
                let mut mod_cursor = child.walk();
                for modifier in child.children(&mut mod_cursor) {
                    if modifier.kind() == "class_modifier" {
                        let text = &source[modifier.byte_range()];
                        if text == "enum" {
                            has_enum_modifier = true;
                        }
                    }
                }
            }
            "interface" => {
                *chunk_type = ChunkType::Interface;
                return true;
            }
            _ => {}
        }
    }

    if has_enum_modifier {
        *chunk_type = ChunkType::Enum;
    }
    // else: stays as Class
    true
}

fn extract_return(signature: &str) -> Option<String> {
    // Kotlin: fun name(params): ReturnType { ... }
    // Look for `: ReturnType` after last `)` and before `{` or `=`
    let paren_pos = signature.rfind(')')?;
    let after_paren = &signature[paren_pos + 1..];

    // Find the terminator ({ or =)
    let end_pos = after_paren
        .find('{')
        .or_else(|| after_paren.find('='))
        .unwrap_or(after_paren.len());
    let between = &after_paren[..end_pos];

    // Look for colon
    let colon_pos = between.find(':')?;
    let ret_type = between[colon_pos + 1..].trim();
    if ret_type.is_empty() || ret_type == "Unit" {
        return None;
    }

    let ret_words = crate::nl::tokenize_identifier(ret_type).join(" ");
    Some(format!("Returns {}", ret_words))
}

static DEFINITION: LanguageDef = LanguageDef {
    name: "kotlin",
    grammar: Some(|| tree_sitter_kotlin::LANGUAGE.into()),
    extensions: &["kt", "kts"],
    chunk_query: CHUNK_QUERY,
    call_query: Some(CALL_QUERY),
    signature_style: SignatureStyle::UntilBrace,
    doc_nodes: DOC_NODES,
    method_node_kinds: &[],
    method_containers: &["class_body"],
    stopwords: STOPWORDS,
    extract_return_nl: extract_return,
    test_file_suggestion: Some(|stem, parent| format!("{parent}/{stem}Test.kt")),
    type_query: Some(TYPE_QUERY),
    common_types: COMMON_TYPES,
    container_body_kinds: &["class_body"],
    extract_container_name: None,
    extract_qualified_method: None,
    post_process_chunk: Some(post_process_kotlin),
    test_markers: &["@Test", "@ParameterizedTest"],
    test_path_patterns: &["%/test/%", "%/tests/%", "%Test.kt"],
    structural_matchers: None,
};

pub fn definition() -> &'static LanguageDef {
    &DEFINITION
}


