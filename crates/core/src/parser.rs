//! Reads the line-oriented textual IR produced by [`crate::printer`].
//!
//! ```text
//! module demo
//!
//! @counter = global i64 5
//! @ext = external global i64
//!
//! declare i64 @puts(ptr)
//!
//! define i64 @main(i64) {
//! entry:
//!   %1 = load i64, @counter
//!   %2 = add i64 %1, %0
//!   store i64 %2, @counter
//!   ret %2
//! }
//! ```
//!
//! Every item sits on its own line; `;` starts a comment. Symbols may be referenced before
//! they are declared, so parsing runs in two passes: the first assigns symbol ids in
//! declaration order, the second builds globals and function bodies.
use crate::ir::{
    BinOp, Block, BlockId, CastOp, CmpPred, ConstExpr, Function, Global, Initializer, Inst,
    InstKind, Linkage, MAX_VALUE_ID, Module, Operand, Signature, Symbol, Type, ValueId,
};
use cloakref_utils::errors::ParseError;
use indexmap::IndexMap;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Local(u32),
    Global(String),
    Int(u64),
    Str(String),
    Bytes(String),
    Meta(String),
    Punct(char),
    Arrow,
}

const fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$')
}

fn take_while(chars: &[char], mut i: usize, pred: impl Fn(char) -> bool) -> (String, usize) {
    let start = i;
    while i < chars.len() && pred(chars[i]) {
        i += 1;
    }
    (chars[start..i].iter().collect(), i)
}

fn lex(line: usize, raw: &str) -> Result<Vec<Tok>, ParseError> {
    let err = |msg: &str| ParseError::Syntax {
        line,
        msg: msg.to_string(),
        raw: raw.trim().to_string(),
    };
    let chars: Vec<char> = raw.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ';' => break,
            c if c.is_whitespace() => i += 1,
            '%' => {
                let (digits, next) = take_while(&chars, i + 1, |c| c.is_ascii_digit());
                let n = digits.parse().map_err(|_| err("expected value number after `%`"))?;
                toks.push(Tok::Local(n));
                i = next;
            }
            '@' => {
                let (name, next) = take_while(&chars, i + 1, is_name_char);
                if name.is_empty() {
                    return Err(err("expected symbol name after `@`"));
                }
                toks.push(Tok::Global(name));
                i = next;
            }
            '!' => {
                let (name, next) = take_while(&chars, i + 1, |c| is_name_char(c) || c == '-');
                if name.is_empty() {
                    return Err(err("expected metadata key after `!`"));
                }
                toks.push(Tok::Meta(name));
                i = next;
            }
            '"' => {
                let (text, next) = take_while(&chars, i + 1, |c| c != '"');
                if next >= chars.len() {
                    return Err(err("unterminated string"));
                }
                toks.push(Tok::Str(text));
                i = next + 1;
            }
            'x' if chars.get(i + 1) == Some(&'"') => {
                let (text, next) = take_while(&chars, i + 2, |c| c != '"');
                if next >= chars.len() {
                    return Err(err("unterminated byte string"));
                }
                toks.push(Tok::Bytes(text));
                i = next + 1;
            }
            '-' if chars.get(i + 1) == Some(&'>') => {
                toks.push(Tok::Arrow);
                i += 2;
            }
            c if c.is_ascii_digit() => {
                let (text, next) = take_while(&chars, i, |c| c.is_ascii_alphanumeric());
                let value = match text.strip_prefix("0x") {
                    Some(hex) => u64::from_str_radix(hex, 16),
                    None => text.parse(),
                }
                .map_err(|_| err(&format!("invalid integer `{text}`")))?;
                toks.push(Tok::Int(value));
                i = next;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let (name, next) = take_while(&chars, i, is_name_char);
                toks.push(Tok::Ident(name));
                i = next;
            }
            '=' | ',' | '(' | ')' | '[' | ']' | '{' | '}' | '+' | ':' => {
                toks.push(Tok::Punct(c));
                i += 1;
            }
            other => return Err(err(&format!("unexpected character `{other}`"))),
        }
    }
    Ok(toks)
}

/// Token cursor over one source line.
struct Cursor<'a> {
    toks: Vec<Tok>,
    pos: usize,
    line: usize,
    raw: &'a str,
    symbols: &'a IndexMap<String, Symbol>,
}

impl Cursor<'_> {
    fn err(&self, msg: impl Into<String>) -> ParseError {
        ParseError::Syntax {
            line: self.line,
            msg: msg.into(),
            raw: self.raw.trim().to_string(),
        }
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Tok> {
        self.toks.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn remaining(&self) -> usize {
        self.toks.len().saturating_sub(self.pos)
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.peek() == Some(&Tok::Punct(c)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: char) -> Result<(), ParseError> {
        if self.eat_punct(c) {
            Ok(())
        } else {
            Err(self.err(format!("expected `{c}`")))
        }
    }

    fn eat_ident(&mut self, kw: &str) -> bool {
        if matches!(self.peek(), Some(Tok::Ident(s)) if s == kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), ParseError> {
        if self.eat_ident(kw) {
            Ok(())
        } else {
            Err(self.err(format!("expected `{kw}`")))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.next() {
            Some(Tok::Ident(s)) => Ok(s),
            _ => Err(self.err("expected identifier")),
        }
    }

    fn expect_int(&mut self) -> Result<u64, ParseError> {
        match self.next() {
            Some(Tok::Int(v)) => Ok(v),
            _ => Err(self.err("expected integer")),
        }
    }

    fn expect_end(&self) -> Result<(), ParseError> {
        if self.remaining() == 0 {
            Ok(())
        } else {
            Err(self.err("unexpected trailing tokens"))
        }
    }

    fn symbol(&self, name: &str) -> Result<Symbol, ParseError> {
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| ParseError::UnknownSymbol {
                line: self.line,
                name: name.to_string(),
            })
    }

    fn parse_type(&mut self) -> Result<Type, ParseError> {
        match self.next() {
            Some(Tok::Ident(s)) => match s.as_str() {
                "i1" => Ok(Type::I1),
                "i8" => Ok(Type::I8),
                "i32" => Ok(Type::I32),
                "i64" => Ok(Type::I64),
                "ptr" => Ok(Type::Ptr),
                other => Err(self.err(format!("unknown type `{other}`"))),
            },
            Some(Tok::Punct('[')) => {
                let len = self.expect_int()?;
                self.expect_keyword("x")?;
                let elem = self.parse_type()?;
                self.expect_punct(']')?;
                let ty = Type::array(elem, len);
                if ty.checked_size().is_none() {
                    return Err(self.err("array size out of range"));
                }
                Ok(ty)
            }
            _ => Err(self.err("expected type")),
        }
    }

    /// `void` or a type.
    fn parse_ret_type(&mut self) -> Result<Option<Type>, ParseError> {
        if self.eat_ident("void") {
            Ok(None)
        } else {
            self.parse_type().map(Some)
        }
    }

    /// `(ty, ty, ...)`
    fn parse_type_list(&mut self) -> Result<Vec<Type>, ParseError> {
        self.expect_punct('(')?;
        let mut types = Vec::new();
        if self.eat_punct(')') {
            return Ok(types);
        }
        loop {
            types.push(self.parse_type()?);
            if self.eat_punct(')') {
                return Ok(types);
            }
            self.expect_punct(',')?;
        }
    }

    /// `fn(ty, ...) -> ty|void`
    fn parse_sig(&mut self) -> Result<Signature, ParseError> {
        self.expect_keyword("fn")?;
        let params = self.parse_type_list()?;
        if self.next() != Some(Tok::Arrow) {
            return Err(self.err("expected `->`"));
        }
        let ret = self.parse_ret_type()?;
        Ok(Signature::new(params, ret))
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        match self.next() {
            Some(Tok::Local(n)) => Ok(Operand::Value(ValueId(n))),
            Some(Tok::Int(v)) => Ok(Operand::Const(v)),
            Some(Tok::Global(name)) => self.symbol(&name).map(Operand::Symbol),
            _ => Err(self.err("expected operand")),
        }
    }

    fn parse_pair(&mut self) -> Result<(Operand, Operand), ParseError> {
        let lhs = self.parse_operand()?;
        self.expect_punct(',')?;
        let rhs = self.parse_operand()?;
        Ok((lhs, rhs))
    }

    fn parse_linkage(&mut self) -> Linkage {
        if self.eat_ident("internal") {
            Linkage::Internal
        } else if self.eat_ident("private") {
            Linkage::Private
        } else {
            Linkage::External
        }
    }
}

struct SourceLine<'a> {
    line: usize,
    raw: &'a str,
    toks: Vec<Tok>,
}

/// Parses a module from its textual form.
pub fn parse_module(text: &str) -> Result<Module, ParseError> {
    let mut lines = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let toks = lex(i + 1, raw)?;
        if !toks.is_empty() {
            lines.push(SourceLine {
                line: i + 1,
                raw,
                toks,
            });
        }
    }

    let symbols = collect_symbols(&lines)?;
    tracing::debug!("Parsing module with {} symbols", symbols.len());

    let mut module = Module::default();
    let mut i = 0;
    while i < lines.len() {
        let src = &lines[i];
        let mut cur = Cursor {
            toks: src.toks.clone(),
            pos: 0,
            line: src.line,
            raw: src.raw,
            symbols: &symbols,
        };
        match cur.peek().cloned() {
            Some(Tok::Ident(kw)) if kw == "module" => {
                cur.next();
                module.name = match cur.next() {
                    Some(Tok::Ident(name)) | Some(Tok::Str(name)) => name,
                    _ => return Err(cur.err("expected module name")),
                };
                cur.expect_end()?;
            }
            Some(Tok::Global(_)) => {
                module.add_global(parse_global(&mut cur)?);
            }
            Some(Tok::Ident(kw)) if kw == "declare" => {
                cur.next();
                let ret = cur.parse_ret_type()?;
                let name = match cur.next() {
                    Some(Tok::Global(name)) => name,
                    _ => return Err(cur.err("expected routine name")),
                };
                let params = cur.parse_type_list()?;
                cur.expect_end()?;
                module.add_function(Function::declaration(name, Signature::new(params, ret)));
            }
            Some(Tok::Ident(kw)) if kw == "define" => {
                cur.next();
                let linkage = cur.parse_linkage();
                let ret = cur.parse_ret_type()?;
                let name = match cur.next() {
                    Some(Tok::Global(name)) => name,
                    _ => return Err(cur.err("expected routine name")),
                };
                let params = cur.parse_type_list()?;
                cur.expect_punct('{')?;
                cur.expect_end()?;

                let body_start = i + 1;
                let mut end = body_start;
                while end < lines.len() && lines[end].toks.first() != Some(&Tok::Punct('}')) {
                    end += 1;
                }
                if end == lines.len() {
                    return Err(cur.err(format!("unterminated body of @{name}")));
                }
                let mut func = Function::declaration(name, Signature::new(params, ret));
                func.linkage = linkage;
                parse_body(&mut func, &lines[body_start..end], &symbols)?;
                module.add_function(func);
                i = end;
            }
            _ => return Err(cur.err("expected `module`, a global, `declare` or `define`")),
        }
        i += 1;
    }

    Ok(module)
}

/// First pass: assigns symbol ids in declaration order.
fn collect_symbols(lines: &[SourceLine<'_>]) -> Result<IndexMap<String, Symbol>, ParseError> {
    let mut symbols = IndexMap::new();
    let (mut globals, mut funcs) = (0, 0);
    for src in lines {
        let (name, symbol) = match (src.toks.first(), src.toks.get(1)) {
            (Some(Tok::Global(name)), Some(Tok::Punct('='))) => {
                globals += 1;
                (name, Symbol::Global(crate::ir::GlobalId(globals - 1)))
            }
            (Some(Tok::Ident(kw)), _) if kw == "declare" || kw == "define" => {
                let Some(name) = src.toks.iter().find_map(|t| match t {
                    Tok::Global(name) => Some(name),
                    _ => None,
                }) else {
                    continue;
                };
                funcs += 1;
                (name, Symbol::Func(crate::ir::FuncId(funcs - 1)))
            }
            _ => continue,
        };
        if symbols.insert(name.clone(), symbol).is_some() {
            return Err(ParseError::DuplicateSymbol(name.clone()));
        }
    }
    Ok(symbols)
}

fn parse_global(cur: &mut Cursor<'_>) -> Result<Global, ParseError> {
    let Some(Tok::Global(name)) = cur.next() else {
        return Err(cur.err("expected global name"));
    };
    cur.expect_punct('=')?;

    if cur.eat_ident("external") {
        cur.expect_keyword("global")?;
        let ty = cur.parse_type()?;
        cur.expect_end()?;
        return Ok(Global {
            name,
            ty,
            linkage: Linkage::External,
            constant: false,
            init: None,
        });
    }

    let linkage = cur.parse_linkage();
    let constant = match cur.expect_ident()?.as_str() {
        "global" => false,
        "constant" => true,
        other => return Err(cur.err(format!("expected `global` or `constant`, got `{other}`"))),
    };
    let ty = cur.parse_type()?;
    let init = match cur.next() {
        Some(Tok::Ident(kw)) if kw == "zeroinitializer" => Initializer::Zero,
        Some(Tok::Int(v)) => Initializer::Int(v),
        Some(Tok::Bytes(text)) => Initializer::Bytes(hex::decode(text)?),
        Some(Tok::Punct('[')) => {
            let mut elems = Vec::new();
            if !cur.eat_punct(']') {
                loop {
                    let elem = match cur.next() {
                        Some(Tok::Int(v)) => ConstExpr::Int(v),
                        Some(Tok::Global(target)) => {
                            let symbol = cur.symbol(&target)?;
                            let offset = if cur.eat_punct('+') {
                                cur.expect_int()?
                            } else {
                                0
                            };
                            ConstExpr::SymbolAddr { symbol, offset }
                        }
                        _ => return Err(cur.err("expected constant array element")),
                    };
                    elems.push(elem);
                    if cur.eat_punct(']') {
                        break;
                    }
                    cur.expect_punct(',')?;
                }
            }
            Initializer::Array(elems)
        }
        _ => return Err(cur.err("expected initializer")),
    };
    cur.expect_end()?;

    Ok(Global {
        name,
        ty,
        linkage,
        constant,
        init: Some(init),
    })
}

fn parse_body(
    func: &mut Function,
    lines: &[SourceLine<'_>],
    symbols: &IndexMap<String, Symbol>,
) -> Result<(), ParseError> {
    let is_label = |toks: &[Tok]| {
        matches!(toks, [Tok::Ident(_), Tok::Punct(':')])
    };

    let mut labels = HashMap::new();
    for src in lines {
        if is_label(&src.toks) {
            if let Tok::Ident(label) = &src.toks[0] {
                labels.insert(label.clone(), BlockId(labels.len()));
                func.blocks.push(Block {
                    label: label.clone(),
                    insts: Vec::new(),
                });
            }
        }
    }

    let mut max_value = func.next_value;
    let mut current: Option<usize> = None;
    for src in lines {
        if is_label(&src.toks) {
            current = Some(current.map_or(0, |b| b + 1));
            continue;
        }
        let mut cur = Cursor {
            toks: src.toks.clone(),
            pos: 0,
            line: src.line,
            raw: src.raw,
            symbols,
        };
        let Some(block) = current else {
            return Err(cur.err("instruction before first label"));
        };
        let inst = parse_inst(&mut cur, &func.name, &labels)?;
        if let Some(result) = inst.result {
            let next = result
                .0
                .checked_add(1)
                .filter(|next| *next <= MAX_VALUE_ID)
                .ok_or_else(|| cur.err("value id out of range"))?;
            max_value = max_value.max(next);
        }
        func.blocks[block].insts.push(inst);
    }
    func.next_value = max_value;
    Ok(())
}

fn parse_inst(
    cur: &mut Cursor<'_>,
    func_name: &str,
    labels: &HashMap<String, BlockId>,
) -> Result<Inst, ParseError> {
    let label = |name: String| {
        labels
            .get(&name)
            .copied()
            .ok_or_else(|| ParseError::UnknownLabel {
                function: func_name.to_string(),
                label: name,
            })
    };

    let result = match (cur.peek(), cur.peek_at(1)) {
        (Some(Tok::Local(n)), Some(Tok::Punct('='))) => {
            let n = *n;
            cur.pos += 2;
            Some(ValueId(n))
        }
        _ => None,
    };

    let opcode = cur.expect_ident()?;
    let kind = match opcode.as_str() {
        "add" | "sub" | "mul" | "xor" | "and" | "or" | "shl" | "lshr" => {
            let op = match opcode.as_str() {
                "add" => BinOp::Add,
                "sub" => BinOp::Sub,
                "mul" => BinOp::Mul,
                "xor" => BinOp::Xor,
                "and" => BinOp::And,
                "or" => BinOp::Or,
                "shl" => BinOp::Shl,
                _ => BinOp::LShr,
            };
            let ty = cur.parse_type()?;
            let (lhs, rhs) = cur.parse_pair()?;
            InstKind::Binary { op, ty, lhs, rhs }
        }
        "icmp" => {
            let pred = match cur.expect_ident()?.as_str() {
                "eq" => CmpPred::Eq,
                "ne" => CmpPred::Ne,
                "ult" => CmpPred::Ult,
                "ule" => CmpPred::Ule,
                "ugt" => CmpPred::Ugt,
                "uge" => CmpPred::Uge,
                other => return Err(cur.err(format!("unknown predicate `{other}`"))),
            };
            let ty = cur.parse_type()?;
            let (lhs, rhs) = cur.parse_pair()?;
            InstKind::ICmp { pred, ty, lhs, rhs }
        }
        "trunc" | "zext" | "ptrtoint" | "inttoptr" => {
            let op = match opcode.as_str() {
                "trunc" => CastOp::Trunc,
                "zext" => CastOp::ZExt,
                "ptrtoint" => CastOp::PtrToInt,
                _ => CastOp::IntToPtr,
            };
            let val = cur.parse_operand()?;
            cur.expect_keyword("to")?;
            let to = cur.parse_type()?;
            InstKind::Cast { op, val, to }
        }
        "load" => {
            let volatile = cur.eat_ident("volatile");
            let ty = cur.parse_type()?;
            cur.expect_punct(',')?;
            let ptr = cur.parse_operand()?;
            InstKind::Load { ty, ptr, volatile }
        }
        "store" => {
            let volatile = cur.eat_ident("volatile");
            let ty = cur.parse_type()?;
            let (val, ptr) = cur.parse_pair()?;
            InstKind::Store {
                ty,
                val,
                ptr,
                volatile,
            }
        }
        "gep" => {
            let inbounds = cur.eat_ident("inbounds");
            let (base, index) = cur.parse_pair()?;
            cur.expect_keyword("x")?;
            let stride = cur.expect_int()?;
            InstKind::Gep {
                base,
                index,
                stride,
                inbounds,
            }
        }
        "fncast" => {
            let val = cur.parse_operand()?;
            cur.expect_keyword("to")?;
            let sig = cur.parse_sig()?;
            InstKind::FnCast { val, sig }
        }
        "call" => {
            let sig = cur.parse_sig()?;
            let callee = cur.parse_operand()?;
            cur.expect_punct('(')?;
            let mut args = Vec::new();
            if !cur.eat_punct(')') {
                loop {
                    args.push(cur.parse_operand()?);
                    if cur.eat_punct(')') {
                        break;
                    }
                    cur.expect_punct(',')?;
                }
            }
            InstKind::Call { callee, sig, args }
        }
        "br" => {
            if cur.remaining() == 1 {
                InstKind::Br {
                    target: label(cur.expect_ident()?)?,
                }
            } else {
                let cond = cur.parse_operand()?;
                cur.expect_punct(',')?;
                let then_bb = label(cur.expect_ident()?)?;
                cur.expect_punct(',')?;
                let else_bb = label(cur.expect_ident()?)?;
                InstKind::CondBr {
                    cond,
                    then_bb,
                    else_bb,
                }
            }
        }
        "ret" => {
            if cur.eat_ident("void") {
                InstKind::Ret { val: None }
            } else {
                InstKind::Ret {
                    val: Some(cur.parse_operand()?),
                }
            }
        }
        other => return Err(cur.err(format!("unknown instruction `{other}`"))),
    };

    let produces_value = match &kind {
        InstKind::Store { .. }
        | InstKind::Br { .. }
        | InstKind::CondBr { .. }
        | InstKind::Ret { .. } => false,
        InstKind::Call { sig, .. } => sig.ret.is_some(),
        _ => true,
    };
    if produces_value != result.is_some() {
        return Err(cur.err(if produces_value {
            "instruction result must be bound to a value"
        } else {
            "instruction does not produce a value"
        }));
    }

    let mut inst = Inst::new(result, kind);
    while let Some(Tok::Meta(key)) = cur.peek().cloned() {
        cur.next();
        match cur.next() {
            Some(Tok::Str(value)) => {
                inst.metadata.insert(key, value);
            }
            _ => return Err(cur.err("expected metadata string")),
        }
    }
    cur.expect_end()?;
    Ok(inst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::print_module;

    const SAMPLE: &str = r#"
module demo

@counter = internal global i64 5
@msg = constant [3 x i8] x"616263"
@refs = private constant [2 x ptr] [@counter + 0x10, @main]
@ext = external global i64

declare i64 @puts(ptr)

define i64 @main(i64) {
entry:
  %1 = load i64, @counter ; current value
  %2 = add i64 %1, %0
  store i64 %2, @counter
  %3 = call fn(ptr) -> i64 @puts(@msg)
  %4 = icmp ult i64 %2, 10
  br %4, small, done
small:
  br done
done:
  %5 = gep inbounds @refs, 1 x 8 !obf.md "obfuscated"
  ret %2
}
"#;

    #[test]
    fn parses_sample_module() {
        let module = parse_module(SAMPLE).unwrap();
        assert_eq!(module.name, "demo");
        assert_eq!(module.globals.len(), 4);
        assert_eq!(module.functions.len(), 2);
        assert!(module.globals[3].is_declaration());
        assert!(module.functions[0].is_declaration());

        let main = &module.functions[1];
        assert_eq!(main.blocks.len(), 3);
        assert_eq!(main.next_value, 6);
        assert_eq!(
            module.globals[2].init,
            Some(Initializer::Array(vec![
                ConstExpr::SymbolAddr {
                    symbol: Symbol::Global(crate::ir::GlobalId(0)),
                    offset: 16
                },
                ConstExpr::SymbolAddr {
                    symbol: Symbol::Func(crate::ir::FuncId(1)),
                    offset: 0
                },
            ]))
        );
        let gep = &main.blocks[2].insts[0];
        assert_eq!(
            gep.metadata.get("obf.md").map(String::as_str),
            Some("obfuscated")
        );
        module.validate().unwrap();
    }

    #[test]
    fn print_parse_round_trip_is_stable() {
        let module = parse_module(SAMPLE).unwrap();
        let printed = print_module(&module);
        let reparsed = parse_module(&printed).unwrap();
        assert_eq!(module, reparsed);
        assert_eq!(printed, print_module(&reparsed));
    }

    #[test]
    fn reports_unknown_symbol() {
        let text = "define void @f() {\nentry:\n  store i64 1, @nowhere\n  ret void\n}\n";
        assert!(matches!(
            parse_module(text),
            Err(ParseError::UnknownSymbol { line: 3, .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_sizes_and_value_ids() {
        let big = "@big = global [2305843009213693952 x i64] zeroinitializer\n";
        assert!(matches!(
            parse_module(big),
            Err(ParseError::Syntax { line: 1, msg, .. }) if msg == "array size out of range"
        ));

        for id in [u32::MAX, u32::MAX - 1, MAX_VALUE_ID] {
            let text =
                format!("define i64 @f() {{\nentry:\n  %{id} = add i64 1, 2\n  ret %{id}\n}}\n");
            assert!(matches!(
                parse_module(&text),
                Err(ParseError::Syntax { line: 3, msg, .. }) if msg == "value id out of range"
            ));
        }
        let text = format!(
            "define i64 @f() {{\nentry:\n  %{0} = add i64 1, 2\n  ret %{0}\n}}\n",
            MAX_VALUE_ID - 1
        );
        let module = parse_module(&text).unwrap();
        assert_eq!(module.functions[0].next_value, MAX_VALUE_ID);
        module.validate().unwrap();
    }

    #[test]
    fn reports_unknown_label() {
        let text = "define void @f() {\nentry:\n  br missing\n}\n";
        assert!(matches!(
            parse_module(text),
            Err(ParseError::UnknownLabel { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_symbols() {
        let text = "@a = global i64 0\ndeclare void @a()\n";
        assert!(matches!(
            parse_module(text),
            Err(ParseError::DuplicateSymbol(name)) if name == "a"
        ));
    }

    #[test]
    fn rejects_missing_result_binding() {
        let text = "define void @f() {\nentry:\n  add i64 1, 2\n  ret void\n}\n";
        assert!(matches!(parse_module(text), Err(ParseError::Syntax { .. })));
    }
}
