//! Itanium C++ ABI demangler.
//!
//! Covers the subset emitted by GCC and Clang for ordinary C++ code:
//! nested and local names, constructors and destructors, operator names,
//! templates with substitutions and template parameters, the special
//! names for vtables, VTTs, typeinfo and guard variables, and virtual and
//! non-virtual thunks. Expressions inside template arguments and vendor
//! vector types are not supported; those symbols fail to demangle.

const MAX_DEPTH: u32 = 256;

/// Demangles an Itanium symbol (`_Z...`).
pub fn demangle_itanium(name: &str) -> Option<String> {
    let mangled = name.strip_prefix("_Z")?;
    let mut parser = Parser::new(mangled.as_bytes());
    let mut out = parser.parse_encoding()?;
    match parser.peek() {
        None => Some(out),
        Some(b'.') => {
            let suffix = std::str::from_utf8(&parser.input[parser.pos..]).ok()?;
            out.push_str(" [clone ");
            out.push_str(suffix);
            out.push(']');
            Some(out)
        }
        Some(_) => None,
    }
}

#[derive(Debug, Clone)]
enum Node {
    Name(String),
    Pointer(Box<Node>),
    LRef(Box<Node>),
    RRef(Box<Node>),
    Qualified {
        inner: Box<Node>,
        quals: String,
    },
    Function {
        ret: Box<Node>,
        params: Vec<Node>,
        quals: String,
    },
    Array {
        len: String,
        element: Box<Node>,
    },
    Pack(Box<Node>),
}

impl Node {
    fn render(&self) -> String {
        match self {
            Node::Name(s) => s.clone(),
            Node::Pointer(inner) => Self::render_indirect(inner, "*"),
            Node::LRef(inner) => Self::render_indirect(inner, "&"),
            Node::RRef(inner) => Self::render_indirect(inner, "&&"),
            Node::Qualified { inner, quals } => format!("{}{}", inner.render(), quals),
            Node::Function { ret, params, quals } => {
                format!("{} ({}){}", ret.render(), render_params(params), quals)
            }
            Node::Array { len, element } => format!("{} [{}]", element.render(), len),
            Node::Pack(inner) => format!("{}...", inner.render()),
        }
    }

    fn render_indirect(inner: &Node, sigil: &str) -> String {
        match inner {
            Node::Function { ret, params, quals } => format!(
                "{} ({})({}){}",
                ret.render(),
                sigil,
                render_params(params),
                quals
            ),
            Node::Array { len, element } => {
                format!("{} ({}) [{}]", element.render(), sigil, len)
            }
            _ => format!("{}{}", inner.render(), sigil),
        }
    }
}

fn render_params(params: &[Node]) -> String {
    if let [Node::Name(only)] = params {
        if only == "void" {
            return String::new();
        }
    }
    params
        .iter()
        .map(Node::render)
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_template_args(args: &[Node]) -> String {
    let joined = args
        .iter()
        .map(Node::render)
        .collect::<Vec<_>>()
        .join(", ");
    format!("<{joined}>")
}

/// A parsed `<name>` with the facts the encoding needs.
#[derive(Debug, Default)]
struct NameInfo {
    text: String,
    is_template: bool,
    is_ctor_dtor_conversion: bool,
    cv_quals: String,
    ref_qual: String,
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    depth: u32,
    subs: Vec<Node>,
    template_args: Vec<Node>,
    template_nesting: u32,
}

impl<'a> Parser<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
            subs: Vec::new(),
            template_args: Vec::new(),
            template_nesting: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn consume(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn consume_str(&mut self, s: &str) -> bool {
        if self.input[self.pos..].starts_with(s.as_bytes()) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn enter(&mut self) -> Option<()> {
        self.depth += 1;
        (self.depth <= MAX_DEPTH).then_some(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn parse_number(&mut self) -> Option<i64> {
        let negative = self.consume(b'n');
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return None;
        }
        let digits = std::str::from_utf8(&self.input[start..self.pos]).ok()?;
        let value: i64 = digits.parse().ok()?;
        Some(if negative { -value } else { value })
    }

    fn parse_source_name(&mut self) -> Option<String> {
        let len = usize::try_from(self.parse_number()?).ok()?;
        let end = self.pos.checked_add(len)?;
        let bytes = self.input.get(self.pos..end)?;
        let name = std::str::from_utf8(bytes).ok()?;
        self.pos = end;
        if name.starts_with("_GLOBAL__N") {
            return Some("(anonymous namespace)".to_string());
        }
        Some(name.to_string())
    }

    /// `<seq-id> _`, base 36 with upper-case digits.
    fn parse_seq_id(&mut self) -> Option<usize> {
        if self.consume(b'_') {
            return Some(0);
        }
        let mut value: usize = 0;
        while let Some(c) = self.peek() {
            let digit = match c {
                b'0'..=b'9' => c - b'0',
                b'A'..=b'Z' => c - b'A' + 10,
                b'_' => break,
                _ => return None,
            };
            value = value.checked_mul(36)?.checked_add(usize::from(digit))?;
            self.pos += 1;
        }
        self.consume(b'_').then_some(value + 1)
    }

    fn parse_substitution(&mut self) -> Option<Node> {
        if !self.consume(b'S') {
            return None;
        }
        let special = match self.peek()? {
            b'a' => "std::allocator",
            b'b' => "std::basic_string",
            b's' => "std::string",
            b'i' => "std::istream",
            b'o' => "std::ostream",
            b'd' => "std::iostream",
            _ => {
                let index = self.parse_seq_id()?;
                return self.subs.get(index).cloned();
            }
        };
        self.pos += 1;
        Some(Node::Name(special.to_string()))
    }

    fn parse_template_param(&mut self) -> Option<Node> {
        if !self.consume(b'T') {
            return None;
        }
        let index = if self.consume(b'_') {
            0
        } else {
            let n = usize::try_from(self.parse_number()?).ok()?;
            if !self.consume(b'_') {
                return None;
            }
            n + 1
        };
        self.template_args.get(index).cloned()
    }

    fn parse_template_args(&mut self) -> Option<Vec<Node>> {
        if !self.consume(b'I') {
            return None;
        }
        self.enter()?;
        self.template_nesting += 1;
        let mut args = Vec::new();
        while !self.consume(b'E') {
            self.peek()?;
            args.push(self.parse_template_arg()?);
        }
        self.template_nesting -= 1;
        if self.template_nesting == 0 {
            self.template_args = args.clone();
        }
        self.leave();
        Some(args)
    }

    fn parse_template_arg(&mut self) -> Option<Node> {
        match self.peek()? {
            b'L' => self.parse_literal(),
            b'J' => {
                self.pos += 1;
                let mut pack = Vec::new();
                while !self.consume(b'E') {
                    self.peek()?;
                    pack.push(self.parse_template_arg()?);
                }
                Some(Node::Name(
                    pack.iter().map(Node::render).collect::<Vec<_>>().join(", "),
                ))
            }
            b'X' => None,
            _ => self.parse_type(),
        }
    }

    fn parse_literal(&mut self) -> Option<Node> {
        if !self.consume(b'L') {
            return None;
        }
        if self.consume_str("_Z") {
            let encoding = self.parse_encoding()?;
            return self.consume(b'E').then_some(Node::Name(encoding));
        }
        let ty = self.parse_type()?;
        let value = self.parse_number()?;
        if !self.consume(b'E') {
            return None;
        }
        let text = match ty.render().as_str() {
            "bool" => (if value == 0 { "false" } else { "true" }).to_string(),
            "int" => value.to_string(),
            "unsigned int" => format!("{value}u"),
            "long" => format!("{value}l"),
            "unsigned long" => format!("{value}ul"),
            other => format!("({other}){value}"),
        };
        Some(Node::Name(text))
    }

    fn builtin(&mut self) -> Option<&'static str> {
        let name = match self.peek()? {
            b'v' => "void",
            b'w' => "wchar_t",
            b'b' => "bool",
            b'c' => "char",
            b'a' => "signed char",
            b'h' => "unsigned char",
            b's' => "short",
            b't' => "unsigned short",
            b'i' => "int",
            b'j' => "unsigned int",
            b'l' => "long",
            b'm' => "unsigned long",
            b'x' => "long long",
            b'y' => "unsigned long long",
            b'n' => "__int128",
            b'o' => "unsigned __int128",
            b'f' => "float",
            b'd' => "double",
            b'e' => "long double",
            b'g' => "__float128",
            b'z' => "...",
            b'D' => {
                let name = match self.peek_at(1)? {
                    b'n' => "std::nullptr_t",
                    b'i' => "char32_t",
                    b's' => "char16_t",
                    b'u' => "char8_t",
                    b'a' => "auto",
                    b'c' => "decltype(auto)",
                    b'h' => "half",
                    b'f' => "decimal32",
                    b'd' => "decimal64",
                    b'e' => "decimal128",
                    _ => return None,
                };
                self.pos += 2;
                return Some(name);
            }
            _ => return None,
        };
        self.pos += 1;
        Some(name)
    }

    fn parse_type(&mut self) -> Option<Node> {
        self.enter()?;
        let ty = self.parse_type_inner();
        self.leave();
        ty
    }

    fn parse_type_inner(&mut self) -> Option<Node> {
        if let Some(name) = self.builtin() {
            return Some(Node::Name(name.to_string()));
        }
        let node = match self.peek()? {
            b'P' => {
                self.pos += 1;
                Node::Pointer(Box::new(self.parse_type()?))
            }
            b'R' => {
                self.pos += 1;
                Node::LRef(Box::new(self.parse_type()?))
            }
            b'O' => {
                self.pos += 1;
                Node::RRef(Box::new(self.parse_type()?))
            }
            b'r' | b'V' | b'K' => {
                let quals = self.parse_cv_qualifiers();
                let inner = self.parse_type()?;
                match inner {
                    Node::Function {
                        ret,
                        params,
                        quals: fn_quals,
                    } => Node::Function {
                        ret,
                        params,
                        quals: fn_quals + &quals,
                    },
                    other => Node::Qualified {
                        inner: Box::new(other),
                        quals,
                    },
                }
            }
            b'F' => self.parse_function_type()?,
            b'A' => {
                self.pos += 1;
                let len = if self.peek() == Some(b'_') {
                    String::new()
                } else {
                    self.parse_number()?.to_string()
                };
                if !self.consume(b'_') {
                    return None;
                }
                Node::Array {
                    len,
                    element: Box::new(self.parse_type()?),
                }
            }
            b'M' => {
                self.pos += 1;
                let class = self.parse_type()?.render();
                let member = self.parse_type()?;
                match member {
                    Node::Function { ret, params, quals } => Node::Name(format!(
                        "{} ({}::*)({}){}",
                        ret.render(),
                        class,
                        render_params(&params),
                        quals
                    )),
                    other => Node::Name(format!("{} {}::*", other.render(), class)),
                }
            }
            b'T' => self.parse_template_param()?,
            b'D' if self.peek_at(1) == Some(b'p') => {
                self.pos += 2;
                Node::Pack(Box::new(self.parse_type()?))
            }
            b'S' if self.peek_at(1) != Some(b't') => {
                let sub = self.parse_substitution()?;
                if self.peek() != Some(b'I') {
                    return Some(sub);
                }
                let args = self.parse_template_args()?;
                Node::Name(format!("{}{}", sub.render(), render_template_args(&args)))
            }
            b'u' => {
                self.pos += 1;
                Node::Name(self.parse_source_name()?)
            }
            b'N' | b'Z' | b'S' | b'0'..=b'9' => Node::Name(self.parse_name()?.text),
            _ => return None,
        };
        self.subs.push(node.clone());
        Some(node)
    }

    fn parse_cv_qualifiers(&mut self) -> String {
        let mut quals = String::new();
        if self.consume(b'r') {
            quals.push_str(" restrict");
        }
        if self.consume(b'V') {
            quals.push_str(" volatile");
        }
        if self.consume(b'K') {
            quals.push_str(" const");
        }
        quals
    }

    fn parse_function_type(&mut self) -> Option<Node> {
        if !self.consume(b'F') {
            return None;
        }
        self.consume(b'Y');
        let ret = self.parse_type()?;
        let mut params = Vec::new();
        let mut quals = String::new();
        loop {
            if self.consume(b'E') {
                break;
            }
            if self.peek() == Some(b'R') && self.peek_at(1) == Some(b'E') {
                self.pos += 2;
                quals.push_str(" &");
                break;
            }
            if self.peek() == Some(b'O') && self.peek_at(1) == Some(b'E') {
                self.pos += 2;
                quals.push_str(" &&");
                break;
            }
            self.peek()?;
            params.push(self.parse_type()?);
        }
        Some(Node::Function {
            ret: Box::new(ret),
            params,
            quals,
        })
    }

    fn parse_operator_name(&mut self) -> Option<(String, bool)> {
        let code = self.input.get(self.pos..self.pos + 2)?;
        let op = match code {
            b"nw" => "new",
            b"na" => "new[]",
            b"dl" => "delete",
            b"da" => "delete[]",
            b"ps" | b"pl" => "+",
            b"ng" | b"mi" => "-",
            b"ad" | b"an" => "&",
            b"de" | b"ml" => "*",
            b"co" => "~",
            b"dv" => "/",
            b"rm" => "%",
            b"or" => "|",
            b"eo" => "^",
            b"aS" => "=",
            b"pL" => "+=",
            b"mI" => "-=",
            b"mL" => "*=",
            b"dV" => "/=",
            b"rM" => "%=",
            b"aN" => "&=",
            b"oR" => "|=",
            b"eO" => "^=",
            b"ls" => "<<",
            b"rs" => ">>",
            b"lS" => "<<=",
            b"rS" => ">>=",
            b"eq" => "==",
            b"ne" => "!=",
            b"lt" => "<",
            b"gt" => ">",
            b"le" => "<=",
            b"ge" => ">=",
            b"ss" => "<=>",
            b"nt" => "!",
            b"aa" => "&&",
            b"oo" => "||",
            b"pp" => "++",
            b"mm" => "--",
            b"cm" => ",",
            b"pm" => "->*",
            b"pt" => "->",
            b"cl" => "()",
            b"ix" => "[]",
            b"qu" => "?",
            b"cv" => {
                self.pos += 2;
                let ty = self.parse_type()?;
                return Some((format!("operator {}", ty.render()), true));
            }
            b"li" => {
                self.pos += 2;
                let suffix = self.parse_source_name()?;
                return Some((format!("operator\"\" {suffix}"), false));
            }
            _ => return None,
        };
        self.pos += 2;
        let spacer = if op.starts_with(|c: char| c.is_ascii_alphabetic()) {
            " "
        } else {
            ""
        };
        Some((format!("operator{spacer}{op}"), false))
    }

    /// `<unqualified-name>` inside a nested or unscoped name.
    ///
    /// Returns the component text and whether it names a constructor,
    /// destructor or conversion operator. `last` is the previous source
    /// name, which constructors and destructors repeat.
    fn parse_unqualified_name(&mut self, last: &str) -> Option<(String, bool)> {
        match self.peek()? {
            b'0'..=b'9' => Some((self.parse_source_name()?, false)),
            b'C' => {
                self.pos += 1;
                let inheriting = self.consume(b'I');
                match self.peek()? {
                    b'1'..=b'5' => self.pos += 1,
                    _ => return None,
                }
                if inheriting {
                    self.parse_type()?;
                }
                Some((strip_template_args(last).to_string(), true))
            }
            b'D' => {
                match self.peek_at(1)? {
                    b'0' | b'1' | b'2' | b'4' | b'5' => self.pos += 2,
                    _ => return None,
                }
                Some((format!("~{}", strip_template_args(last)), true))
            }
            b'U' => {
                self.pos += 1;
                match self.peek()? {
                    b't' => {
                        self.pos += 1;
                        let n = if self.peek() == Some(b'_') {
                            1
                        } else {
                            self.parse_number()? + 2
                        };
                        self.consume(b'_').then(|| (format!("{{unnamed type#{n}}}"), false))
                    }
                    b'l' => {
                        self.pos += 1;
                        let mut params = Vec::new();
                        while !self.consume(b'E') {
                            self.peek()?;
                            params.push(self.parse_type()?);
                        }
                        let n = if self.peek() == Some(b'_') {
                            1
                        } else {
                            self.parse_number()? + 2
                        };
                        self.consume(b'_').then(|| {
                            (format!("{{lambda({})#{n}}}", render_params(&params)), false)
                        })
                    }
                    _ => None,
                }
            }
            b'L' => {
                self.pos += 1;
                self.parse_unqualified_name(last)
            }
            _ => self.parse_operator_name(),
        }
    }

    fn parse_name(&mut self) -> Option<NameInfo> {
        self.enter()?;
        let name = match self.peek()? {
            b'N' => self.parse_nested_name(),
            b'Z' => self.parse_local_name(),
            b'S' if self.peek_at(1) == Some(b't') => {
                self.pos += 2;
                let (component, ctor) = self.parse_unqualified_name("")?;
                self.finish_unscoped(format!("std::{component}"), ctor)
            }
            b'S' => {
                let sub = self.parse_substitution()?.render();
                if self.peek() != Some(b'I') {
                    return None;
                }
                let args = self.parse_template_args()?;
                Some(NameInfo {
                    text: format!("{sub}{}", render_template_args(&args)),
                    is_template: true,
                    ..NameInfo::default()
                })
            }
            _ => {
                let (component, ctor) = self.parse_unqualified_name("")?;
                self.finish_unscoped(component, ctor)
            }
        };
        self.leave();
        name
    }

    fn finish_unscoped(&mut self, text: String, ctor: bool) -> Option<NameInfo> {
        if self.peek() != Some(b'I') {
            return Some(NameInfo {
                text,
                is_ctor_dtor_conversion: ctor,
                ..NameInfo::default()
            });
        }
        self.subs.push(Node::Name(text.clone()));
        let args = self.parse_template_args()?;
        Some(NameInfo {
            text: format!("{text}{}", render_template_args(&args)),
            is_template: true,
            is_ctor_dtor_conversion: ctor,
            ..NameInfo::default()
        })
    }

    fn parse_nested_name(&mut self) -> Option<NameInfo> {
        if !self.consume(b'N') {
            return None;
        }
        let cv_quals = self.parse_cv_qualifiers();
        let ref_qual = if self.consume(b'R') {
            " &".to_string()
        } else if self.consume(b'O') {
            " &&".to_string()
        } else {
            String::new()
        };

        let mut prefix = String::new();
        let mut last_source = String::new();
        let mut is_template = false;
        let mut is_special = false;

        while !self.consume(b'E') {
            let mut push = true;
            match self.peek()? {
                b'S' if self.peek_at(1) == Some(b't') => {
                    self.pos += 2;
                    prefix = "std".to_string();
                    push = false;
                }
                b'S' => {
                    prefix = self.parse_substitution()?.render();
                    last_source = prefix.rsplit("::").next().unwrap_or_default().to_string();
                    push = false;
                }
                b'I' => {
                    if prefix.is_empty() {
                        return None;
                    }
                    let args = self.parse_template_args()?;
                    prefix.push_str(&render_template_args(&args));
                    is_template = true;
                }
                b'T' => {
                    prefix = self.parse_template_param()?.render();
                }
                _ => {
                    let (component, special) = self.parse_unqualified_name(&last_source)?;
                    if !special {
                        last_source = component.clone();
                    }
                    is_special = special;
                    is_template = false;
                    if prefix.is_empty() {
                        prefix = component;
                    } else {
                        prefix = format!("{prefix}::{component}");
                    }
                }
            }
            if push && self.peek() != Some(b'E') {
                self.subs.push(Node::Name(prefix.clone()));
            }
        }

        Some(NameInfo {
            text: prefix,
            is_template,
            is_ctor_dtor_conversion: is_special,
            cv_quals,
            ref_qual,
        })
    }

    fn parse_local_name(&mut self) -> Option<NameInfo> {
        if !self.consume(b'Z') {
            return None;
        }
        let outer = self.parse_encoding()?;
        if !self.consume(b'E') {
            return None;
        }
        if self.consume(b's') {
            self.skip_discriminator();
            return Some(NameInfo {
                text: format!("{outer}::string literal"),
                ..NameInfo::default()
            });
        }
        let mut inner = self.parse_name()?;
        self.skip_discriminator();
        inner.text = format!("{outer}::{}", inner.text);
        Some(inner)
    }

    fn skip_discriminator(&mut self) {
        if self.consume(b'_') {
            if self.consume(b'_') {
                let _ = self.parse_number();
                self.consume(b'_');
            } else {
                let _ = self.parse_number();
            }
        }
    }

    fn parse_call_offset(&mut self) -> Option<()> {
        match self.peek()? {
            b'h' => {
                self.pos += 1;
                self.parse_number()?;
                self.consume(b'_').then_some(())
            }
            b'v' => {
                self.pos += 1;
                self.parse_number()?;
                if !self.consume(b'_') {
                    return None;
                }
                self.parse_number()?;
                self.consume(b'_').then_some(())
            }
            _ => None,
        }
    }

    fn parse_special_name(&mut self) -> Option<String> {
        let code = self.input.get(self.pos..self.pos + 2)?;
        let (label, takes_type) = match code {
            b"TV" => ("vtable for ", true),
            b"TT" => ("VTT for ", true),
            b"TI" => ("typeinfo for ", true),
            b"TS" => ("typeinfo name for ", true),
            b"GV" => ("guard variable for ", false),
            b"TW" => ("TLS wrapper function for ", false),
            b"TH" => ("TLS init function for ", false),
            b"Th" | b"Tv" => {
                let label = if code == b"Th" {
                    "non-virtual thunk to "
                } else {
                    "virtual thunk to "
                };
                self.pos += 1;
                self.parse_call_offset()?;
                return Some(format!("{label}{}", self.parse_encoding()?));
            }
            b"Tc" => {
                self.pos += 2;
                self.parse_call_offset()?;
                self.parse_call_offset()?;
                return Some(format!(
                    "covariant return thunk to {}",
                    self.parse_encoding()?
                ));
            }
            _ => return None,
        };
        self.pos += 2;
        let subject = if takes_type {
            self.parse_type()?.render()
        } else {
            self.parse_name()?.text
        };
        Some(format!("{label}{subject}"))
    }

    fn parse_encoding(&mut self) -> Option<String> {
        self.enter()?;
        let result = self.parse_encoding_inner();
        self.leave();
        result
    }

    fn parse_encoding_inner(&mut self) -> Option<String> {
        if matches!(self.peek()?, b'T' | b'G') {
            return self.parse_special_name();
        }

        let name = self.parse_name()?;
        if matches!(self.peek(), None | Some(b'E') | Some(b'.')) {
            return Some(name.text);
        }

        let mut out = String::new();
        if name.is_template && !name.is_ctor_dtor_conversion {
            out.push_str(&self.parse_type()?.render());
            out.push(' ');
        }

        let mut params = Vec::new();
        while !matches!(self.peek(), None | Some(b'E') | Some(b'.')) {
            params.push(self.parse_type()?);
        }
        out.push_str(&name.text);
        out.push('(');
        out.push_str(&render_params(&params));
        out.push(')');
        out.push_str(&name.cv_quals);
        out.push_str(&name.ref_qual);
        Some(out)
    }
}

/// Drops a trailing template argument list: `Foo<int>` becomes `Foo`.
fn strip_template_args(name: &str) -> &str {
    match name.find('<') {
        Some(i) => &name[..i],
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(mangled: &str, expected: &str) {
        assert_eq!(
            demangle_itanium(mangled).as_deref(),
            Some(expected),
            "demangling {mangled}"
        );
    }

    #[test]
    fn test_free_functions() {
        check("_Z3fooi", "foo(int)");
        check("_Z3barv", "bar()");
        check("_Z1fPKc", "f(char const*)");
        check("_Z4sortPviPFiPKvS1_E", "sort(void*, int, int (*)(void const*, void const*))");
    }

    #[test]
    fn test_member_functions() {
        check("_ZN4Base6methodEPi", "Base::method(int*)");
        check("_ZNK1A3getEv", "A::get() const");
        check("_ZN2ns7Derived6methodEv", "ns::Derived::method()");
    }

    #[test]
    fn test_constructors_and_destructors() {
        check("_ZN1BC2Ev", "B::B()");
        check("_ZN1BC1Ei", "B::B(int)");
        check("_ZN1BD0Ev", "B::~B()");
        check("_ZN2ns4BaseD2Ev", "ns::Base::~Base()");
    }

    #[test]
    fn test_special_names() {
        check("_ZTV4Base", "vtable for Base");
        check("_ZTVN2ns7DerivedE", "vtable for ns::Derived");
        check("_ZTI4Base", "typeinfo for Base");
        check("_ZTS4Base", "typeinfo name for Base");
        check("_ZGVZ4mainE1x", "guard variable for main::x");
    }

    #[test]
    fn test_thunks() {
        check("_ZThn8_N1C1fEv", "non-virtual thunk to C::f()");
        check("_ZTv0_n24_N1C1fEv", "virtual thunk to C::f()");
    }

    #[test]
    fn test_templates_and_substitutions() {
        check("_ZN3FooIiE3barEv", "Foo<int>::bar()");
        check("_Z3maxIiET_S0_S0_", "int max<int>(int, int)");
        check(
            "_ZNSt6vectorIiSaIiEE9push_backERKi",
            "std::vector<int, std::allocator<int>>::push_back(int const&)",
        );
        check("_ZN1A1fERKS_", "A::f(A const&)");
    }

    #[test]
    fn test_operators() {
        check("_ZN1AplERKS_", "A::operator+(A const&)");
        check("_ZN1AaSEOS_", "A::operator=(A&&)");
        check("_ZN1AclEv", "A::operator()()");
        check("_ZN1AcviEv", "A::operator int()");
    }

    #[test]
    fn test_clone_suffix() {
        check("_Z3fooi.constprop.0", "foo(int) [clone .constprop.0]");
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(demangle_itanium("foo"), None);
        assert_eq!(demangle_itanium("_Z"), None);
        assert_eq!(demangle_itanium("_Z999foo"), None);
        assert_eq!(demangle_itanium("_ZN3fooE!"), None);
    }

    #[test]
    fn test_deep_nesting_is_bounded() {
        let mangled = format!("_Z1f{}i", "P".repeat(10_000));
        assert_eq!(demangle_itanium(&mangled), None);
    }
}
