//! Objective-C language definition

use super::{LanguageDef, SignatureStyle};

/// Tree-sitter query for extracting Objective-C code chunks
const CHUNK_QUERY: &str = r#"
;; Class interfaces (@interface ... @end)
(class_interface
  (identifier) @name) @class

;; Protocols (@protocol ... @end)
(protocol_declaration
  (identifier) @name) @interface

;; Method declarations (in @interface or @protocol — no body)
(method_declaration
  (identifier) @name) @function

;; Method definitions (in @implementation — with body)
(method_definition
  (identifier) @name) @function

;; C-style free functions
(function_definition
  declarator: (function_declarator
    declarator: (identifier) @name)) @function

;; Properties with pointer types (@property NSString *name)
(property_declaration
  (struct_declaration
    (struct_declarator
      (pointer_declarator
        (identifier) @name)))) @property

;; Properties with value types (@property NSInteger age)
(property_declaration
  (struct_declaration
    (struct_declarator
      (identifier) @name))) @property
"#;

/// Tree-sitter query for extracting function calls
const CALL_QUERY: &str = r#"
;; Objective-C message sends [receiver method]
(message_expression
  (identifier) @callee)

;; C function calls
(call_expression
  function: (identifier) @callee)
"#;

/// Doc comment node types
const DOC_NODES: &[&str] = &["comment"];

const STOPWORDS: &[&str] = &[
    "self", "super", "nil", "NULL", "YES", "NO", "true", "false", "if", "else", "for", "while",
    "do", "switch", "case", "break", "continue", "return", "void", "int", "float", "double",
    "char", "long", "short", "unsigned", "signed", "static", "extern", "const", "typedef",
    "struct", "enum", "union", "id", "Class", "SEL", "IMP", "BOOL", "NSObject", "NSString",
    "NSInteger", "NSUInteger", "CGFloat", "nonatomic", "strong", "weak", "copy", "assign",
    "readonly", "readwrite", "atomic", "property", "synthesize", "dynamic", "interface",
    "implementation", "protocol", "end", "optional", "required", "import", "include",
];

fn extract_return(_signature: &str) -> Option<String> {
    // ObjC methods use `- (ReturnType)methodName` syntax which doesn't lend itself
    // to simple text-based extraction. Return None.
    None
}

static DEFINITION: LanguageDef = LanguageDef {
    name: "objc",
    grammar: Some(|| tree_sitter_objc::LANGUAGE.into()),
    extensions: &["m", "mm"],
    chunk_query: CHUNK_QUERY,
    call_query: Some(CALL_QUERY),
    signature_style: SignatureStyle::UntilBrace,
    doc_nodes: DOC_NODES,
    method_node_kinds: &[],
    method_containers: &["class_interface", "implementation_definition", "protocol_declaration"],
    stopwords: STOPWORDS,
    extract_return_nl: extract_return,
    test_file_suggestion: Some(|stem, parent| format!("{parent}/{stem}Tests.m")),
    type_query: None,
    common_types: &[],
    container_body_kinds: &["implementation_definition"],
    extract_container_name: None,
    extract_qualified_method: None,
    post_process_chunk: None,
};

pub fn definition() -> &'static LanguageDef {
    &DEFINITION
}


