//! Lexical scanner for Go source files.
//!
//! This is not a Go parser. It tokenizes a file well enough to find the
//! package clause, the import declarations, and the top-level function
//! declarations together with the last comment group of each body, which is
//! everything run-mode selection needs.

use thiserror::Error;

/// Failure to scan a Go source file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// A comment, string, or rune literal runs to the end of the file.
    #[error("unterminated {what} starting at byte {offset}")]
    Unterminated {
        /// What was left open.
        what: &'static str,
        /// Byte offset of the opening delimiter.
        offset: usize,
    },

    /// The file does not start with a package clause.
    #[error("expected package clause")]
    MissingPackageClause,

    /// A declaration is malformed.
    #[error("malformed {what} at byte {offset}")]
    Malformed {
        /// The construct being scanned.
        what: &'static str,
        /// Byte offset of the offending token.
        offset: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Ident,
    Literal,
    Comment,
    Punct(char),
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    kind: TokenKind,
    text: &'a str,
    start: usize,
    end: usize,
    /// Whether an implicit semicolon precedes this token.
    after_newline: bool,
}

impl Token<'_> {
    fn is_ident(&self, word: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == word
    }

    fn is_punct(&self, punct: char) -> bool {
        self.kind == TokenKind::Punct(punct)
    }

    fn ends_statement(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Ident | TokenKind::Literal | TokenKind::Punct(')' | ']' | '}')
        )
    }
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    const fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        self.src.get(self.pos..).unwrap_or_default()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let next = self.peek()?;
        self.pos += next.len_utf8();
        Some(next)
    }

    fn eat_while(&mut self, keep: impl Fn(char) -> bool) {
        while self.peek().is_some_and(&keep) {
            self.bump();
        }
    }

    /// Tokenize the whole input, comments included.
    fn tokenize(mut self) -> Result<Vec<Token<'a>>, ScanError> {
        let mut tokens = vec![];
        let mut newline = false;

        loop {
            let skipped_from = self.pos;
            self.eat_while(char::is_whitespace);
            newline |= self
                .src
                .get(skipped_from..self.pos)
                .is_some_and(|gap| gap.contains('\n'));

            let start = self.pos;
            let Some(first) = self.bump() else {
                break;
            };
            let kind = self.token_kind(first, start)?;
            let text = self.src.get(start..self.pos).unwrap_or_default();
            tokens.push(Token {
                kind,
                text,
                start,
                end: self.pos,
                after_newline: newline,
            });
            if kind == TokenKind::Comment {
                newline |= text.starts_with("//") || text.contains('\n');
            } else {
                newline = false;
            }
        }
        Ok(tokens)
    }

    fn token_kind(&mut self, first: char, start: usize) -> Result<TokenKind, ScanError> {
        let kind = match first {
            '/' if self.peek() == Some('/') => {
                self.eat_while(|c| c != '\n');
                TokenKind::Comment
            }
            '/' if self.peek() == Some('*') => {
                let close = self
                    .rest()
                    .get(1..)
                    .and_then(|rest| rest.find("*/"))
                    .ok_or(ScanError::Unterminated {
                        what: "comment",
                        offset: start,
                    })?;
                self.pos += close + 3;
                TokenKind::Comment
            }
            '"' => {
                self.quoted('"', "string", start)?;
                TokenKind::Literal
            }
            '\'' => {
                self.quoted('\'', "rune literal", start)?;
                TokenKind::Literal
            }
            '`' => {
                let close = self.rest().find('`').ok_or(ScanError::Unterminated {
                    what: "raw string",
                    offset: start,
                })?;
                self.pos += close + 1;
                TokenKind::Literal
            }
            c if c.is_alphabetic() || c == '_' => {
                self.eat_while(|c| c.is_alphanumeric() || c == '_');
                TokenKind::Ident
            }
            c if c.is_ascii_digit() => {
                self.eat_while(|c| c.is_alphanumeric() || c == '_' || c == '.');
                TokenKind::Literal
            }
            c => TokenKind::Punct(c),
        };
        Ok(kind)
    }

    fn quoted(&mut self, quote: char, what: &'static str, start: usize) -> Result<(), ScanError> {
        let unterminated = ScanError::Unterminated {
            what,
            offset: start,
        };
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(()),
                Some('\\') => {
                    self.bump().ok_or_else(|| unterminated.clone())?;
                }
                Some('\n') | None => return Err(unterminated),
                Some(_) => {}
            }
        }
    }
}

/// The `package` clause of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageClause {
    name: String,
    end: usize,
}

impl PackageClause {
    /// Return the declared package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the byte offset just past the package name.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.end
    }
}

/// One import spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    name: Option<String>,
    path: String,
}

impl ImportSpec {
    /// Return the local name (`.`, `_` or an alias), if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Return the unquoted import path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// A top-level function declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncDecl {
    name: String,
    is_method: bool,
    has_params: bool,
    has_results: bool,
    last_comment: Option<String>,
}

impl FuncDecl {
    /// Return the function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return whether the declaration has a receiver.
    #[must_use]
    pub const fn is_method(&self) -> bool {
        self.is_method
    }

    /// Return whether the signature declares parameters.
    #[must_use]
    pub const fn has_params(&self) -> bool {
        self.has_params
    }

    /// Return whether the signature declares results.
    #[must_use]
    pub const fn has_results(&self) -> bool {
        self.has_results
    }

    /// Return the text of the last comment group inside the body, formatted
    /// the way `go/ast` renders comment text.
    #[must_use]
    pub fn last_comment(&self) -> Option<&str> {
        self.last_comment.as_deref()
    }
}

/// Scan result for one Go source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    package: PackageClause,
    imports: Vec<ImportSpec>,
    import_end: Option<usize>,
    funcs: Vec<FuncDecl>,
}

impl ScannedFile {
    /// Return the package clause.
    #[must_use]
    pub const fn package(&self) -> &PackageClause {
        &self.package
    }

    /// Return the import specs in source order.
    #[must_use]
    pub fn imports(&self) -> &[ImportSpec] {
        &self.imports
    }

    /// Return the top-level functions in source order.
    #[must_use]
    pub fn funcs(&self) -> &[FuncDecl] {
        &self.funcs
    }

    /// Return the byte offset after which a new import declaration may be
    /// inserted: the end of the last import declaration, or the end of the
    /// package clause when there are none.
    #[must_use]
    pub fn import_insertion_offset(&self) -> usize {
        self.import_end.unwrap_or(self.package.end)
    }

    /// Return whether `path` is imported under its own name.
    #[must_use]
    pub fn imports_unaliased(&self, path: &str) -> bool {
        self.imports
            .iter()
            .any(|spec| spec.path == path && spec.name.is_none())
    }

    /// Return whether the file declares a plain `func main`.
    #[must_use]
    pub fn has_main(&self) -> bool {
        self.funcs
            .iter()
            .any(|func| func.name == "main" && !func.is_method)
    }
}

/// Scan only the package clause of `src`.
///
/// Returns `None` when the file does not start with a well-formed clause;
/// the rest of the file is not examined.
#[must_use]
pub fn package_clause(src: &str) -> Option<PackageClause> {
    let mut lexer = Lexer::new(src);
    let mut significant = vec![];
    while significant.len() < 2 {
        lexer.eat_while(char::is_whitespace);
        let start = lexer.pos;
        let first = lexer.bump()?;
        let kind = lexer.token_kind(first, start).ok()?;
        if kind != TokenKind::Comment {
            let text = src.get(start..lexer.pos)?;
            significant.push((kind, text, lexer.pos));
        }
    }
    match significant.as_slice() {
        [(TokenKind::Ident, "package", _), (TokenKind::Ident, name, end)] => Some(PackageClause {
            name: String::from(*name),
            end: *end,
        }),
        _ => None,
    }
}

/// Scan `src` for its package clause, imports and top-level functions.
///
/// # Errors
///
/// Returns [`ScanError`] for unterminated literals or comments, a missing
/// package clause, or a malformed import or function declaration.
pub fn scan(src: &str) -> Result<ScannedFile, ScanError> {
    let tokens = Lexer::new(src).tokenize()?;
    let code: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, token)| token.kind != TokenKind::Comment)
        .map(|(index, _)| index)
        .collect();
    let mut parser = Parser {
        src,
        tokens: &tokens,
        code: &code,
        cursor: 0,
    };

    let package = parser.package_clause()?;
    let (imports, import_end) = parser.imports()?;
    let funcs = parser.funcs()?;

    Ok(ScannedFile {
        package,
        imports,
        import_end,
        funcs,
    })
}

struct Parser<'s, 't> {
    src: &'s str,
    tokens: &'t [Token<'s>],
    /// Indices into `tokens` of every non-comment token.
    code: &'t [usize],
    /// Position within `code`.
    cursor: usize,
}

impl<'s> Parser<'s, '_> {
    fn token_at(&self, cursor: usize) -> Option<&Token<'s>> {
        self.code
            .get(cursor)
            .and_then(|&index| self.tokens.get(index))
    }

    fn peek(&self) -> Option<&Token<'s>> {
        self.token_at(self.cursor)
    }

    fn next(&mut self) -> Option<Token<'s>> {
        let token = self.peek().copied();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn malformed(&self, what: &'static str) -> ScanError {
        ScanError::Malformed {
            what,
            offset: self.peek().map_or(self.src.len(), |token| token.start),
        }
    }

    fn skip_semicolons(&mut self) {
        while self.peek().is_some_and(|token| token.is_punct(';')) {
            self.cursor += 1;
        }
    }

    fn package_clause(&mut self) -> Result<PackageClause, ScanError> {
        match (self.next(), self.next()) {
            (Some(keyword), Some(name))
                if keyword.is_ident("package") && name.kind == TokenKind::Ident =>
            {
                Ok(PackageClause {
                    name: String::from(name.text),
                    end: name.end,
                })
            }
            _ => Err(ScanError::MissingPackageClause),
        }
    }

    fn imports(&mut self) -> Result<(Vec<ImportSpec>, Option<usize>), ScanError> {
        let mut specs = vec![];
        let mut decl_end = None;

        loop {
            self.skip_semicolons();
            if !self.peek().is_some_and(|token| token.is_ident("import")) {
                break;
            }
            self.cursor += 1;

            if self.peek().is_some_and(|token| token.is_punct('(')) {
                self.cursor += 1;
                loop {
                    self.skip_semicolons();
                    match self.peek() {
                        Some(token) if token.is_punct(')') => {
                            decl_end = Some(token.end);
                            self.cursor += 1;
                            break;
                        }
                        Some(_) => specs.push(self.import_spec()?.0),
                        None => return Err(self.malformed("import declaration")),
                    }
                }
            } else {
                let (spec, end) = self.import_spec()?;
                specs.push(spec);
                decl_end = Some(end);
            }
        }
        Ok((specs, decl_end))
    }

    fn import_spec(&mut self) -> Result<(ImportSpec, usize), ScanError> {
        let name = match self.peek() {
            Some(token) if token.kind == TokenKind::Ident || token.is_punct('.') => {
                let alias = String::from(token.text);
                self.cursor += 1;
                Some(alias)
            }
            _ => None,
        };
        match self.next() {
            Some(path) if path.kind == TokenKind::Literal && is_string_literal(path.text) => Ok((
                ImportSpec {
                    name,
                    path: unquote(path.text),
                },
                path.end,
            )),
            _ => Err(self.malformed("import spec")),
        }
    }

    fn funcs(&mut self) -> Result<Vec<FuncDecl>, ScanError> {
        let mut funcs = vec![];
        let mut depth = 0_usize;
        let mut previous: Option<Token<'s>> = None;

        while let Some(token) = self.next() {
            let at_declaration_start = depth == 0
                && previous.is_none_or(|prev| {
                    prev.is_punct(';') || (token.after_newline && prev.ends_statement())
                });
            if at_declaration_start && token.is_ident("func") {
                funcs.push(self.func_decl()?);
                previous = self.token_at(self.cursor.saturating_sub(1)).copied();
                continue;
            }
            match token.kind {
                TokenKind::Punct('(' | '[' | '{') => depth += 1,
                TokenKind::Punct(')' | ']' | '}') => depth = depth.saturating_sub(1),
                _ => {}
            }
            previous = Some(token);
        }
        Ok(funcs)
    }

    /// Scan a function declaration whose `func` keyword was just consumed.
    fn func_decl(&mut self) -> Result<FuncDecl, ScanError> {
        let is_method = self.peek().is_some_and(|token| token.is_punct('('));
        if is_method {
            self.skip_group('(', ')')?;
        }

        let name = match self.next() {
            Some(token) if token.kind == TokenKind::Ident => String::from(token.text),
            _ => return Err(self.malformed("function name")),
        };

        if self.peek().is_some_and(|token| token.is_punct('[')) {
            self.skip_group('[', ']')?;
        }
        if !self.peek().is_some_and(|token| token.is_punct('(')) {
            return Err(self.malformed("function signature"));
        }
        let params_open = self.cursor;
        self.skip_group('(', ')')?;
        let has_params = self.cursor - params_open > 2;

        let results_start = self.cursor;
        let body_open = loop {
            match self.peek().copied() {
                Some(token) if token.is_punct('{') => {
                    let opens_type = self.cursor > results_start
                        && self
                            .token_at(self.cursor - 1)
                            .is_some_and(|prev| prev.is_ident("struct") || prev.is_ident("interface"));
                    if !opens_type {
                        break Some(token);
                    }
                    self.skip_group('{', '}')?;
                }
                Some(token) if token.is_punct(';') || token.after_newline => break None,
                Some(token) if token.is_punct('(') => self.skip_group('(', ')')?,
                Some(token) if token.is_punct('[') => self.skip_group('[', ']')?,
                Some(_) => self.cursor += 1,
                None => break None,
            }
        };
        let has_results = self.cursor > results_start;

        let last_comment = match body_open {
            Some(open) => {
                self.skip_group('{', '}')?;
                let close_start = self
                    .token_at(self.cursor - 1)
                    .map_or(self.src.len(), |close| close.start);
                self.last_comment_group(open.end, close_start)
            }
            None => None,
        };

        Ok(FuncDecl {
            name,
            is_method,
            has_params,
            has_results,
            last_comment,
        })
    }

    /// Skip a balanced `open ... close` group starting at the cursor.
    fn skip_group(&mut self, open: char, close: char) -> Result<(), ScanError> {
        let mut depth = 0_usize;
        while let Some(token) = self.next() {
            if token.is_punct(open) {
                depth += 1;
            } else if token.is_punct(close) {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Ok(());
                }
            }
        }
        Err(self.malformed("bracketed group"))
    }

    /// Return the text of the last comment group lying within `start..end`.
    fn last_comment_group(&self, start: usize, end: usize) -> Option<String> {
        let mut groups: Vec<Vec<&str>> = vec![];
        let mut previous: Option<&Token<'s>> = None;

        for token in self.tokens {
            if token.start < start || token.end > end {
                continue;
            }
            if token.kind != TokenKind::Comment {
                previous = Some(token);
                continue;
            }
            let joins_group = previous.is_some_and(|prev| {
                prev.kind == TokenKind::Comment
                    && self
                        .src
                        .get(prev.end..token.start)
                        .is_some_and(|gap| gap.matches('\n').count() <= 1)
            });
            match groups.last_mut() {
                Some(group) if joins_group => group.push(token.text),
                _ => groups.push(vec![token.text]),
            }
            previous = Some(token);
        }
        groups.pop().map(|group| comment_text(&group))
    }
}

fn is_string_literal(text: &str) -> bool {
    text.starts_with('"') || text.starts_with('`')
}

fn unquote(literal: &str) -> String {
    let inner = literal
        .get(1..literal.len().saturating_sub(1))
        .unwrap_or_default();
    String::from(inner)
}

/// Render a comment group the way `go/ast.CommentGroup.Text` does: markers
/// removed, one leading space stripped from line comments, directives
/// skipped, trailing whitespace trimmed, leading blank lines dropped, runs of
/// blank lines collapsed, and a final newline added.
fn comment_text(comments: &[&str]) -> String {
    let mut lines: Vec<&str> = vec![];
    for comment in comments {
        let body = if let Some(line) = comment.strip_prefix("//") {
            match line.strip_prefix(' ') {
                Some(stripped) => stripped,
                None if is_directive(line) => continue,
                None => line,
            }
        } else {
            comment
                .strip_prefix("/*")
                .and_then(|rest| rest.strip_suffix("*/"))
                .unwrap_or(comment)
        };
        lines.extend(body.split('\n').map(str::trim_end));
    }

    let mut kept: Vec<&str> = vec![];
    for line in lines {
        let after_blank = kept.last().is_none_or(|last| last.is_empty());
        if !line.is_empty() || !after_blank {
            kept.push(line);
        }
    }
    if kept.last().is_some_and(|last| !last.is_empty()) {
        kept.push("");
    }
    kept.join("\n")
}

/// Return whether a line comment body is a tool directive such as
/// `//go:build` or `//line`.
fn is_directive(line: &str) -> bool {
    if line.starts_with("line ") || line.starts_with("extern ") || line.starts_with("export ") {
        return true;
    }
    let Some((prefix, _)) = line.split_once(':') else {
        return false;
    };
    !prefix.is_empty()
        && prefix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && line
            .get(prefix.len() + 1..)
            .and_then(|rest| rest.chars().next())
            .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

#[cfg(test)]
mod tests;
