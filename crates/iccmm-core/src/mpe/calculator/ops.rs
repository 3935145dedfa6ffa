//! Calculator operations
//!
//! Each operation is 8 bytes on the wire: a 4-byte signature and 4 bytes
//! of operand data. Depending on the operation the data is a float
//! constant, a pair of u16 fields (s, t), or a u32 count or index.

use std::fmt;

use crate::icc::error::sig_str;
use crate::mpe::Element;

const fn sig(b: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*b)
}

pub const DATA: u32 = sig(b"data");
pub const IN: u32 = sig(b"in  ");
pub const OUT: u32 = sig(b"out ");
pub const TGET: u32 = sig(b"tget");
pub const TPUT: u32 = sig(b"tput");
pub const TSAV: u32 = sig(b"tsav");

pub const CURV: u32 = sig(b"curv");
pub const MTX: u32 = sig(b"mtx ");
pub const CLUT: u32 = sig(b"clut");
pub const CALC: u32 = sig(b"calc");
pub const ELEM: u32 = sig(b"elem");

pub const COPY: u32 = sig(b"copy");
pub const ROTL: u32 = sig(b"rotl");
pub const ROTR: u32 = sig(b"rotr");
pub const POSD: u32 = sig(b"posd");
pub const FLIP: u32 = sig(b"flip");
pub const POP: u32 = sig(b"pop ");

pub const ADD: u32 = sig(b"add ");
pub const SUB: u32 = sig(b"sub ");
pub const MUL: u32 = sig(b"mul ");
pub const DIV: u32 = sig(b"div ");
pub const MOD: u32 = sig(b"mod ");
pub const POW: u32 = sig(b"pow ");
pub const MIN: u32 = sig(b"min ");
pub const MAX: u32 = sig(b"max ");
pub const AND: u32 = sig(b"and ");
pub const OR: u32 = sig(b"or  ");
pub const ATN2: u32 = sig(b"atn2");

pub const LT: u32 = sig(b"lt  ");
pub const LE: u32 = sig(b"le  ");
pub const EQ: u32 = sig(b"eq  ");
pub const NE: u32 = sig(b"ne  ");
pub const GE: u32 = sig(b"ge  ");
pub const GT: u32 = sig(b"gt  ");

pub const SQ: u32 = sig(b"sq  ");
pub const SQRT: u32 = sig(b"sqrt");
pub const CB: u32 = sig(b"cb  ");
pub const CBRT: u32 = sig(b"cbrt");
pub const ABS: u32 = sig(b"abs ");
pub const NEG: u32 = sig(b"neg ");
pub const ROND: u32 = sig(b"rond");
pub const FLOR: u32 = sig(b"flor");
pub const CEIL: u32 = sig(b"ceil");
pub const TRNC: u32 = sig(b"trnc");
pub const SIGN: u32 = sig(b"sign");
pub const EXP: u32 = sig(b"exp ");
pub const LOG: u32 = sig(b"log ");
pub const LN: u32 = sig(b"ln  ");
pub const SIN: u32 = sig(b"sin ");
pub const COS: u32 = sig(b"cos ");
pub const TAN: u32 = sig(b"tan ");
pub const ASIN: u32 = sig(b"asin");
pub const ACOS: u32 = sig(b"acos");
pub const ATAN: u32 = sig(b"atan");
pub const NOT: u32 = sig(b"not ");

pub const SUM: u32 = sig(b"sum ");
pub const PROD: u32 = sig(b"prod");
pub const VMIN: u32 = sig(b"vmin");
pub const VMAX: u32 = sig(b"vmax");

pub const PI: u32 = sig(b"pi  ");
pub const POS_INF: u32 = sig(b"+INF");
pub const NEG_INF: u32 = sig(b"-INF");
pub const NAN: u32 = sig(b"NaN ");

pub const GAMA: u32 = sig(b"gama");

pub const IF: u32 = sig(b"if  ");
pub const ELSE: u32 = sig(b"else");
pub const SEL: u32 = sig(b"sel ");
pub const CASE: u32 = sig(b"case");
pub const DFLT: u32 = sig(b"dflt");

/// One calculator operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Op {
    pub sig: u32,
    pub data: u32,
}

/// How an operation changes the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Effect {
    /// Needs `pops` values on the stack and leaves `pushes` in their place
    Stack { pops: usize, pushes: usize },
    /// Block header handled by the control-flow logic
    Control,
    Unknown,
}

impl Op {
    pub const fn new(sig: u32, data: u32) -> Self {
        Self { sig, data }
    }

    /// Operation with a (s, t) operand pair
    pub const fn with_st(sig: u32, s: u16, t: u16) -> Self {
        Self::new(sig, ((s as u32) << 16) | t as u32)
    }

    /// 'data' pushing a constant
    pub fn constant(v: f32) -> Self {
        Self::new(DATA, v.to_bits())
    }

    pub fn s(&self) -> usize {
        (self.data >> 16) as usize
    }

    pub fn t(&self) -> usize {
        (self.data & 0xFFFF) as usize
    }

    pub fn value(&self) -> f32 {
        f32::from_bits(self.data)
    }

    pub(crate) fn effect(&self, subs: &[Box<dyn Element>]) -> Effect {
        let s1 = self.s() + 1;
        let t1 = self.t() + 1;
        let stack = |pops, pushes| Effect::Stack { pops, pushes };
        match self.sig {
            DATA | PI | POS_INF | NEG_INF | NAN => stack(0, 1),
            IN | TGET => stack(0, t1),
            OUT | TPUT => stack(t1, 0),
            TSAV => stack(t1, t1),
            CURV | MTX | CLUT | CALC | ELEM => match subs.get(self.data as usize) {
                Some(e) => stack(e.input_channels(), e.output_channels()),
                None => Effect::Unknown,
            },
            COPY => stack(s1, s1 * (t1 + 1)),
            ROTL | ROTR | FLIP => stack(s1, s1),
            POSD => stack(s1, s1 + t1),
            POP => stack(s1, 0),
            ADD | SUB | MUL | DIV | MOD | POW | MIN | MAX | AND | OR | ATN2 | LT | LE | EQ
            | NE | GE | GT => stack(2 * s1, s1),
            SQ | SQRT | CB | CBRT | ABS | NEG | ROND | FLOR | CEIL | TRNC | SIGN | EXP | LOG
            | LN | SIN | COS | TAN | ASIN | ACOS | ATAN | NOT => stack(s1, s1),
            SUM | PROD | VMIN | VMAX => stack(s1, 1),
            GAMA => stack(s1 + 1, s1),
            IF | SEL => stack(1, 0),
            ELSE | CASE | DFLT => Effect::Control,
            _ => Effect::Unknown,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = sig_str(self.sig);
        let name = name.trim_end();
        match self.sig {
            DATA => write!(f, "{} {}", name, self.value()),
            IF | ELSE | CASE | DFLT => write!(f, "{} {}", name, self.data),
            CURV | MTX | CLUT | CALC | ELEM => write!(f, "{} ({})", name, self.data),
            IN | OUT | TGET | TPUT | TSAV | COPY | ROTL | ROTR | POSD => {
                write!(f, "{} ({},{})", name, self.s(), self.t())
            }
            PI | POS_INF | NEG_INF | NAN | SEL => f.write_str(name),
            _ if self.s() > 0 => write!(f, "{} ({})", name, self.s()),
            _ => f.write_str(name),
        }
    }
}
