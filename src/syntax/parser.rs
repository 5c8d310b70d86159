use crate::context::Language;
use crate::syntax::errors::SyntaxError;
use tree_sitter::{Parser, Tree};

fn grammar(language: Language) -> Result<tree_sitter::Language, SyntaxError> {
    match language {
        // The JavaScript grammar covers JSX
        Language::JavaScript | Language::Jsx => Ok(tree_sitter_javascript::LANGUAGE.into()),
        Language::TypeScript => Ok(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        Language::Tsx => Ok(tree_sitter_typescript::LANGUAGE_TSX.into()),
        Language::Unknown => Err(SyntaxError::Unsupported(language)),
    }
}

/// Tree-sitter parser for one script language.
pub struct ScriptParser {
    parser: Parser,
    language: Language,
}

impl ScriptParser {
    pub fn new(language: Language) -> Result<Self, SyntaxError> {
        let mut parser = Parser::new();
        parser
            .set_language(&grammar(language)?)
            .map_err(|_| SyntaxError::LanguageSet)?;
        Ok(Self { parser, language })
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn parse(&mut self, source: &str) -> Result<Tree, SyntaxError> {
        self.parser
            .parse(source, None)
            .ok_or(SyntaxError::ParseFailed)
    }

    pub fn parse_with_source<'a>(
        &mut self,
        source: &'a str,
    ) -> Result<ParsedSource<'a>, SyntaxError> {
        let tree = self.parse(source)?;
        Ok(ParsedSource { source, tree })
    }
}

/// A parsed source file with its tree-sitter tree.
pub struct ParsedSource<'a> {
    pub source: &'a str,
    pub tree: Tree,
}

impl ParsedSource<'_> {
    pub fn root_node(&self) -> tree_sitter::Node<'_> {
        self.tree.root_node()
    }

    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    /// Every ERROR or MISSING node, in document order.
    pub fn error_nodes(&self) -> Vec<ErrorNode> {
        let mut errors = Vec::new();
        collect_error_nodes(self.tree.root_node(), self.source, &mut errors);
        errors
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorNode {
    pub byte_start: usize,
    pub byte_end: usize,
    /// 1-based
    pub line: usize,
    /// 1-based
    pub column: usize,
    /// Source around the node, newlines escaped
    pub context: String,
}

fn collect_error_nodes(node: tree_sitter::Node<'_>, source: &str, errors: &mut Vec<ErrorNode>) {
    if node.is_error() || node.is_missing() {
        let start = node.start_position();
        let context_start = node.start_byte().saturating_sub(20);
        let context_end = (node.end_byte() + 20).min(source.len());
        errors.push(ErrorNode {
            byte_start: node.start_byte(),
            byte_end: node.end_byte(),
            line: start.row + 1,
            column: start.column + 1,
            context: source
                .get(context_start..context_end)
                .unwrap_or("")
                .replace('\n', "\\n"),
        });
    }

    if !node.has_error() {
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_error_nodes(child, source, errors);
    }
}
