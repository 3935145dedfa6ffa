//! Calculator interpreter and static stack check
//!
//! Programs run on an explicit value stack with an explicit program
//! counter. `if`/`sel` blocks only jump forward, so a program always
//! terminates; the instruction budget bounds total work across nested
//! calculators as well.

use super::ops::{self, Effect, Op};
use crate::error::EvaluationFault;
use crate::icc::types::TypeSignature;
use crate::mpe::{ApplyContext, Element};

/// Values the stack may hold
pub(crate) const MAX_STACK: usize = 4096;

/// Deepest allowed if/sel block nesting inside one program
pub(crate) const MAX_BLOCK_DEPTH: usize = 64;

/// Where a conditional's blocks sit in the program
struct Blocks {
    /// (start, end) of each selectable block
    arms: Vec<(usize, usize)>,
    /// Index into `arms` of the `else`/`dflt` block, if present
    fallback: Option<usize>,
    /// First op after the whole construct
    after: usize,
}

fn checked_end(start: usize, len: u32, limit: usize, pc: usize) -> Result<usize, EvaluationFault> {
    start
        .checked_add(len as usize)
        .filter(|&end| end <= limit)
        .ok_or(EvaluationFault::BadOperand { pc })
}

/// Lay out the blocks of the `if` or `sel` at `pc`. `limit` is the end of
/// the enclosing block.
fn blocks(program: &[Op], pc: usize, limit: usize) -> Result<Blocks, EvaluationFault> {
    let op = program[pc];
    let mut lens = Vec::new();
    let mut fallback = None;
    let mut next = pc + 1;

    if op.sig == ops::IF {
        lens.push(op.data);
        if let Some(e) = program.get(next).filter(|e| e.sig == ops::ELSE && next < limit) {
            lens.push(e.data);
            fallback = Some(1);
            next += 1;
        }
    } else {
        while let Some(c) = program.get(next).filter(|c| c.sig == ops::CASE && next < limit) {
            lens.push(c.data);
            next += 1;
        }
        if let Some(d) = program.get(next).filter(|d| d.sig == ops::DFLT && next < limit) {
            lens.push(d.data);
            fallback = Some(lens.len() - 1);
            next += 1;
        }
    }

    let mut arms = Vec::with_capacity(lens.len());
    let mut start = next;
    for len in lens {
        let end = checked_end(start, len, limit, pc)?;
        arms.push((start, end));
        start = end;
    }
    Ok(Blocks {
        arms,
        fallback,
        after: start,
    })
}

struct Machine<'a> {
    subs: &'a [Box<dyn Element>],
    stack: Vec<f32>,
    temps: Vec<f32>,
    pc: usize,
}

impl Machine<'_> {
    fn need(&self, needed: usize) -> Result<usize, EvaluationFault> {
        let depth = self.stack.len();
        if depth < needed {
            return Err(EvaluationFault::StackUnderflow {
                pc: self.pc,
                needed,
                depth,
            });
        }
        Ok(depth - needed)
    }

    fn room(&self, extra: usize) -> Result<(), EvaluationFault> {
        if self.stack.len() + extra > MAX_STACK {
            return Err(EvaluationFault::StackOverflow { pc: self.pc });
        }
        Ok(())
    }

    fn push(&mut self, v: f32) -> Result<(), EvaluationFault> {
        self.room(1)?;
        self.stack.push(v);
        Ok(())
    }

    fn pop(&mut self) -> Result<f32, EvaluationFault> {
        let base = self.need(1)?;
        let v = self.stack[base];
        self.stack.truncate(base);
        Ok(v)
    }

    /// Range `s..=s+t` checked against a register file of `len`
    fn range(&self, op: Op, len: usize) -> Result<std::ops::Range<usize>, EvaluationFault> {
        let start = op.s();
        let end = start + op.t() + 1;
        if end > len {
            return Err(EvaluationFault::BadOperand { pc: self.pc });
        }
        Ok(start..end)
    }

    fn binary(&mut self, n: usize, f: impl Fn(f32, f32) -> f32) -> Result<(), EvaluationFault> {
        let base = self.need(2 * n)?;
        for i in 0..n {
            let b = self.stack[base + n + i];
            let a = &mut self.stack[base + i];
            *a = f(*a, b);
        }
        self.stack.truncate(base + n);
        Ok(())
    }

    fn unary(&mut self, n: usize, f: impl Fn(f32) -> f32) -> Result<(), EvaluationFault> {
        let base = self.need(n)?;
        for v in &mut self.stack[base..] {
            *v = f(*v);
        }
        Ok(())
    }

    fn fold(&mut self, n: usize, f: impl Fn(f32, f32) -> f32) -> Result<(), EvaluationFault> {
        let base = self.need(n)?;
        let first = self.stack[base];
        let v = self.stack[base + 1..].iter().fold(first, |acc, &x| f(acc, x));
        self.stack.truncate(base);
        self.stack.push(v);
        Ok(())
    }

    fn call(&mut self, ctx: &mut ApplyContext, op: Op) -> Result<(), EvaluationFault> {
        let index = op.data as usize;
        let bad = EvaluationFault::BadSubElement {
            pc: self.pc,
            index,
        };
        let sub = self.subs.get(index).ok_or(bad)?;
        let expected = match op.sig {
            ops::CURV => Some(TypeSignature::CURVE_SET),
            ops::MTX => Some(TypeSignature::MATRIX),
            ops::CLUT => Some(TypeSignature::CLUT),
            ops::CALC => Some(TypeSignature::CALCULATOR),
            _ => None,
        };
        if expected.is_some_and(|sig| sig != sub.type_sig()) {
            return Err(bad);
        }

        let (inputs, outputs) = (sub.input_channels(), sub.output_channels());
        let base = self.need(inputs)?;
        self.room(outputs.saturating_sub(inputs))?;
        let mut result = vec![0.0f32; outputs];

        let nested = sub.type_sig() == TypeSignature::CALCULATOR;
        if nested {
            if ctx.depth + 1 >= ctx.max_depth {
                return Err(EvaluationFault::NestingDepth(ctx.max_depth));
            }
            ctx.depth += 1;
        }
        sub.apply(ctx, &mut result, &self.stack[base..])?;
        if nested {
            ctx.depth -= 1;
        }

        self.stack.truncate(base);
        self.stack.extend_from_slice(&result);
        Ok(())
    }
}

fn truth(v: f32) -> bool {
    v >= 0.5
}

fn flag(b: bool) -> f32 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Execute `program` for one color. `dst` starts zeroed; `out` ops fill it.
pub(crate) fn execute(
    program: &[Op],
    subs: &[Box<dyn Element>],
    temp_count: usize,
    ctx: &mut ApplyContext,
    dst: &mut [f32],
    src: &[f32],
) -> Result<(), EvaluationFault> {
    dst.fill(0.0);
    let mut m = Machine {
        subs,
        stack: Vec::with_capacity(64),
        temps: vec![0.0; temp_count],
        pc: 0,
    };
    // (block end, resume at)
    let mut frames: Vec<(usize, usize)> = Vec::new();

    loop {
        while let Some(&(end, resume)) = frames.last() {
            if m.pc < end {
                break;
            }
            m.pc = resume;
            frames.pop();
        }
        if m.pc >= program.len() {
            break;
        }

        ctx.executed += 1;
        if ctx.executed > ctx.budget {
            return Err(EvaluationFault::InstructionBudget(ctx.budget));
        }

        let op = program[m.pc];
        let n = op.s() + 1;
        match op.sig {
            ops::DATA => m.push(op.value())?,
            ops::PI => m.push(std::f32::consts::PI)?,
            ops::POS_INF => m.push(f32::INFINITY)?,
            ops::NEG_INF => m.push(f32::NEG_INFINITY)?,
            ops::NAN => m.push(f32::NAN)?,

            ops::IN => {
                let range = m.range(op, src.len())?;
                m.room(range.len())?;
                m.stack.extend_from_slice(&src[range]);
            }
            ops::OUT => {
                let range = m.range(op, dst.len())?;
                let base = m.need(range.len())?;
                dst[range].copy_from_slice(&m.stack[base..]);
                m.stack.truncate(base);
            }
            ops::TGET => {
                let range = m.range(op, m.temps.len())?;
                m.room(range.len())?;
                let values = &m.temps[range];
                m.stack.extend_from_slice(values);
            }
            ops::TPUT | ops::TSAV => {
                let range = m.range(op, m.temps.len())?;
                let base = m.need(range.len())?;
                m.temps[range].copy_from_slice(&m.stack[base..]);
                if op.sig == ops::TPUT {
                    m.stack.truncate(base);
                }
            }

            ops::CURV | ops::MTX | ops::CLUT | ops::CALC | ops::ELEM => m.call(ctx, op)?,

            ops::COPY => {
                let base = m.need(n)?;
                let copies = op.t() + 1;
                m.room(n * copies)?;
                for _ in 0..copies {
                    m.stack.extend_from_within(base..base + n);
                }
            }
            ops::ROTL | ops::ROTR => {
                let base = m.need(n)?;
                let k = (op.t() + 1) % n;
                if op.sig == ops::ROTL {
                    m.stack[base..].rotate_left(k);
                } else {
                    m.stack[base..].rotate_right(k);
                }
            }
            ops::POSD => {
                let base = m.need(n)?;
                let copies = op.t() + 1;
                m.room(copies)?;
                let v = m.stack[base];
                m.stack.extend(std::iter::repeat(v).take(copies));
            }
            ops::FLIP => {
                let base = m.need(n)?;
                m.stack[base..].reverse();
            }
            ops::POP => {
                let base = m.need(n)?;
                m.stack.truncate(base);
            }

            ops::ADD => m.binary(n, |a, b| a + b)?,
            ops::SUB => m.binary(n, |a, b| a - b)?,
            ops::MUL => m.binary(n, |a, b| a * b)?,
            ops::DIV => m.binary(n, |a, b| a / b)?,
            ops::MOD => m.binary(n, |a, b| a % b)?,
            ops::POW => m.binary(n, f32::powf)?,
            ops::MIN => m.binary(n, |a, b| if a.is_nan() || b.is_nan() { f32::NAN } else { a.min(b) })?,
            ops::MAX => m.binary(n, |a, b| if a.is_nan() || b.is_nan() { f32::NAN } else { a.max(b) })?,
            ops::AND => m.binary(n, |a, b| flag(truth(a) && truth(b)))?,
            ops::OR => m.binary(n, |a, b| flag(truth(a) || truth(b)))?,
            ops::ATN2 => m.binary(n, f32::atan2)?,

            ops::LT => m.binary(n, |a, b| flag(a < b))?,
            ops::LE => m.binary(n, |a, b| flag(a <= b))?,
            ops::EQ => m.binary(n, |a, b| flag(a == b))?,
            ops::NE => m.binary(n, |a, b| flag(a != b && !a.is_nan() && !b.is_nan()))?,
            ops::GE => m.binary(n, |a, b| flag(a >= b))?,
            ops::GT => m.binary(n, |a, b| flag(a > b))?,

            ops::SQ => m.unary(n, |x| x * x)?,
            ops::SQRT => m.unary(n, f32::sqrt)?,
            ops::CB => m.unary(n, |x| x * x * x)?,
            ops::CBRT => m.unary(n, f32::cbrt)?,
            ops::ABS => m.unary(n, f32::abs)?,
            ops::NEG => m.unary(n, |x| -x)?,
            ops::ROND => m.unary(n, f32::round)?,
            ops::FLOR => m.unary(n, f32::floor)?,
            ops::CEIL => m.unary(n, f32::ceil)?,
            ops::TRNC => m.unary(n, f32::trunc)?,
            ops::SIGN => m.unary(n, |x| {
                if x > 0.0 {
                    1.0
                } else if x < 0.0 {
                    -1.0
                } else {
                    x
                }
            })?,
            ops::EXP => m.unary(n, f32::exp)?,
            ops::LOG => m.unary(n, f32::log10)?,
            ops::LN => m.unary(n, f32::ln)?,
            ops::SIN => m.unary(n, f32::sin)?,
            ops::COS => m.unary(n, f32::cos)?,
            ops::TAN => m.unary(n, f32::tan)?,
            ops::ASIN => m.unary(n, f32::asin)?,
            ops::ACOS => m.unary(n, f32::acos)?,
            ops::ATAN => m.unary(n, f32::atan)?,
            ops::NOT => m.unary(n, |x| flag(!truth(x)))?,

            ops::SUM => m.fold(n, |a, b| a + b)?,
            ops::PROD => m.fold(n, |a, b| a * b)?,
            ops::VMIN => m.fold(n, |a, b| if a.is_nan() || b.is_nan() { f32::NAN } else { a.min(b) })?,
            ops::VMAX => m.fold(n, |a, b| if a.is_nan() || b.is_nan() { f32::NAN } else { a.max(b) })?,

            ops::GAMA => {
                let g = m.pop()?;
                m.unary(n, |x| x.powf(g))?;
            }

            ops::IF | ops::SEL => {
                let limit = frames.last().map_or(program.len(), |f| f.0);
                let layout = blocks(program, m.pc, limit)?;
                let selector = m.pop()?;
                let chosen = if op.sig == ops::IF {
                    if truth(selector) {
                        Some(0)
                    } else {
                        layout.fallback
                    }
                } else {
                    let cases = layout.arms.len() - usize::from(layout.fallback.is_some());
                    if selector.is_finite() && selector.fract() == 0.0 && selector >= 0.0 && (selector as usize) < cases {
                        Some(selector as usize)
                    } else {
                        layout.fallback
                    }
                };
                match chosen.map(|i| layout.arms[i]) {
                    Some((start, end)) => {
                        if frames.len() >= MAX_BLOCK_DEPTH {
                            return Err(EvaluationFault::NestingDepth(MAX_BLOCK_DEPTH));
                        }
                        frames.push((end, layout.after));
                        m.pc = start;
                    }
                    None => m.pc = layout.after,
                }
                continue;
            }

            _ => return Err(EvaluationFault::BadOperand { pc: m.pc }),
        }
        m.pc += 1;
    }
    Ok(())
}

/// Problem found by [`check`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProgramFault {
    pub pc: usize,
    pub message: String,
}

/// Results of a successful [`check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProgramShape {
    /// Deepest the stack can get
    pub max_stack: usize,
    /// Fewest values that can be left on the stack at the end
    pub min_final: usize,
}

struct Checker<'a> {
    program: &'a [Op],
    subs: &'a [Box<dyn Element>],
    inputs: usize,
    outputs: usize,
    temps: usize,
    max_stack: usize,
}

impl Checker<'_> {
    fn fault(pc: usize, message: impl Into<String>) -> ProgramFault {
        ProgramFault {
            pc,
            message: message.into(),
        }
    }

    /// Walk `start..end` with the stack depth somewhere in `lo..=hi`
    fn block(
        &mut self,
        start: usize,
        end: usize,
        mut lo: usize,
        mut hi: usize,
        nesting: usize,
    ) -> Result<(usize, usize), ProgramFault> {
        if nesting > MAX_BLOCK_DEPTH {
            return Err(Self::fault(start, "blocks nested too deeply"));
        }
        let mut pc = start;
        while pc < end {
            let op = self.program[pc];
            let bounded = |limit: usize, what: &str| {
                if op.s() + op.t() + 1 > limit {
                    Err(Self::fault(pc, format!("{} refers past {} {}", op, limit, what)))
                } else {
                    Ok(())
                }
            };
            match op.sig {
                ops::IN => bounded(self.inputs, "input channels")?,
                ops::OUT => bounded(self.outputs, "output channels")?,
                ops::TGET | ops::TPUT | ops::TSAV => bounded(self.temps, "temporaries")?,
                ops::CURV | ops::MTX | ops::CLUT | ops::CALC | ops::ELEM => {
                    let sub = self
                        .subs
                        .get(op.data as usize)
                        .ok_or_else(|| Self::fault(pc, format!("{} has no sub-element", op)))?;
                    let expected = match op.sig {
                        ops::CURV => Some(TypeSignature::CURVE_SET),
                        ops::MTX => Some(TypeSignature::MATRIX),
                        ops::CLUT => Some(TypeSignature::CLUT),
                        ops::CALC => Some(TypeSignature::CALCULATOR),
                        _ => None,
                    };
                    if expected.is_some_and(|sig| sig != sub.type_sig()) {
                        return Err(Self::fault(
                            pc,
                            format!("{} refers to a '{}' element", op, sub.type_sig()),
                        ));
                    }
                }
                _ => {}
            }

            match op.effect(self.subs) {
                Effect::Stack { pops, pushes } => {
                    if lo < pops {
                        return Err(Self::fault(
                            pc,
                            format!("{} needs {} values but only {} may be on the stack", op, pops, lo),
                        ));
                    }
                    lo = lo - pops + pushes;
                    hi = hi - pops + pushes;
                    self.max_stack = self.max_stack.max(hi);
                    if hi > MAX_STACK {
                        return Err(Self::fault(pc, "stack can exceed its limit"));
                    }
                }
                Effect::Control => return Err(Self::fault(pc, format!("'{}' without a matching header", op))),
                Effect::Unknown => return Err(Self::fault(pc, format!("unknown operation '{}'", op))),
            }

            if op.sig == ops::IF || op.sig == ops::SEL {
                let layout = blocks(self.program, pc, end).map_err(|_| Self::fault(pc, format!("{} blocks run past their end", op)))?;
                let (mut out_lo, mut out_hi) = if layout.fallback.is_some() {
                    (usize::MAX, 0)
                } else {
                    (lo, hi)
                };
                for &(s, e) in &layout.arms {
                    let (l, h) = self.block(s, e, lo, hi, nesting + 1)?;
                    out_lo = out_lo.min(l);
                    out_hi = out_hi.max(h);
                }
                if out_lo == usize::MAX {
                    out_lo = lo;
                }
                lo = out_lo;
                hi = out_hi;
                pc = layout.after;
            } else {
                pc += 1;
            }
        }
        Ok((lo, hi))
    }
}

/// Number of temporaries a program addresses
pub(crate) fn temp_count(program: &[Op]) -> usize {
    program
        .iter()
        .filter(|op| matches!(op.sig, ops::TGET | ops::TPUT | ops::TSAV))
        .map(|op| op.s() + op.t() + 1)
        .max()
        .unwrap_or(0)
}

/// Check that no path through `program` can underflow the stack, address
/// a missing channel, temporary or sub-element, or run a malformed block
pub(crate) fn check(
    program: &[Op],
    subs: &[Box<dyn Element>],
    inputs: usize,
    outputs: usize,
) -> Result<ProgramShape, ProgramFault> {
    let mut checker = Checker {
        program,
        subs,
        inputs,
        outputs,
        temps: temp_count(program),
        max_stack: 0,
    };
    let (min_final, _) = checker.block(0, program.len(), 0, 0, 0)?;
    Ok(ProgramShape {
        max_stack: checker.max_stack,
        min_final,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(program: &[Op], inputs: &[f32], outputs: usize) -> Result<Vec<f32>, EvaluationFault> {
        let mut out = vec![0.0; outputs];
        let mut ctx = ApplyContext::default();
        execute(program, &[], temp_count(program), &mut ctx, &mut out, inputs)?;
        Ok(out)
    }

    #[test]
    fn test_arithmetic() {
        let program = [
            Op::with_st(ops::IN, 0, 1),
            Op::new(ops::ADD, 0),
            Op::constant(2.0),
            Op::new(ops::MUL, 0),
            Op::with_st(ops::OUT, 0, 0),
        ];
        assert_eq!(run(&program, &[0.25, 0.5], 1).unwrap(), vec![1.5]);
    }

    #[test]
    fn test_vector_ops_use_s_plus_one_pairs() {
        // (a0, a1) - (b0, b1)
        let program = [
            Op::constant(5.0),
            Op::constant(7.0),
            Op::constant(1.0),
            Op::constant(2.0),
            Op::with_st(ops::SUB, 1, 0),
            Op::with_st(ops::OUT, 0, 1),
        ];
        assert_eq!(run(&program, &[], 2).unwrap(), vec![4.0, 5.0]);
    }

    #[test]
    fn test_stack_manipulation() {
        let program = [
            Op::constant(1.0),
            Op::constant(2.0),
            Op::constant(3.0),
            Op::with_st(ops::ROTL, 2, 0),
            Op::with_st(ops::OUT, 0, 2),
        ];
        assert_eq!(run(&program, &[], 3).unwrap(), vec![2.0, 3.0, 1.0]);

        let program = [
            Op::constant(1.0),
            Op::constant(2.0),
            Op::with_st(ops::COPY, 1, 0),
            Op::with_st(ops::POSD, 3, 0),
            Op::with_st(ops::OUT, 0, 4),
        ];
        assert_eq!(run(&program, &[], 5).unwrap(), vec![1.0, 2.0, 1.0, 2.0, 1.0]);

        let program = [
            Op::constant(1.0),
            Op::constant(2.0),
            Op::with_st(ops::FLIP, 1, 0),
            Op::with_st(ops::OUT, 0, 1),
        ];
        assert_eq!(run(&program, &[], 2).unwrap(), vec![2.0, 1.0]);
    }

    #[test]
    fn test_temporaries() {
        let program = [
            Op::constant(3.0),
            Op::with_st(ops::TSAV, 4, 0),
            Op::with_st(ops::TGET, 4, 0),
            Op::new(ops::MUL, 0),
            Op::with_st(ops::OUT, 0, 0),
        ];
        assert_eq!(temp_count(&program), 5);
        assert_eq!(run(&program, &[], 1).unwrap(), vec![9.0]);
    }

    #[test]
    fn test_if_else() {
        let program = |cond: f32| {
            vec![
                Op::constant(cond),
                Op::new(ops::IF, 1),
                Op::new(ops::ELSE, 1),
                Op::constant(10.0),
                Op::constant(20.0),
                Op::with_st(ops::OUT, 0, 0),
            ]
        };
        assert_eq!(run(&program(1.0), &[], 1).unwrap(), vec![10.0]);
        assert_eq!(run(&program(0.0), &[], 1).unwrap(), vec![20.0]);
        assert_eq!(run(&program(f32::NAN), &[], 1).unwrap(), vec![20.0]);
    }

    #[test]
    fn test_select() {
        let program = |index: f32| {
            vec![
                Op::constant(index),
                Op::new(ops::SEL, 0),
                Op::new(ops::CASE, 1),
                Op::new(ops::CASE, 1),
                Op::new(ops::DFLT, 1),
                Op::constant(1.0),
                Op::constant(2.0),
                Op::constant(3.0),
                Op::with_st(ops::OUT, 0, 0),
            ]
        };
        assert_eq!(run(&program(0.0), &[], 1).unwrap(), vec![1.0]);
        assert_eq!(run(&program(1.0), &[], 1).unwrap(), vec![2.0]);
        assert_eq!(run(&program(7.0), &[], 1).unwrap(), vec![3.0]);
        assert_eq!(run(&program(0.5), &[], 1).unwrap(), vec![3.0]);
    }

    #[test]
    fn test_nan_and_infinity() {
        let program = [
            Op::with_st(ops::IN, 0, 1),
            Op::new(ops::DIV, 0),
            Op::with_st(ops::OUT, 0, 0),
            Op::new(ops::NAN, 0),
            Op::constant(1.0),
            Op::new(ops::LT, 0),
            Op::with_st(ops::OUT, 1, 0),
        ];
        let out = run(&program, &[1.0, 0.0], 2).unwrap();
        assert_eq!(out[0], f32::INFINITY);
        assert_eq!(out[1], 0.0);

        let out = run(&program, &[f32::INFINITY, f32::INFINITY], 2).unwrap();
        assert!(out[0].is_nan());
    }

    #[test]
    fn test_underflow_is_fault() {
        let program = [Op::constant(1.0), Op::with_st(ops::POP, 3, 0)];
        assert_eq!(
            run(&program, &[], 1),
            Err(EvaluationFault::StackUnderflow {
                pc: 1,
                needed: 4,
                depth: 1
            })
        );
        assert!(check(&program, &[], 0, 1).is_err());
    }

    #[test]
    fn test_bad_operands() {
        let program = [Op::with_st(ops::IN, 2, 0)];
        assert_eq!(run(&program, &[0.0], 1), Err(EvaluationFault::BadOperand { pc: 0 }));

        let program = [Op::new(ops::ELSE, 0)];
        assert_eq!(run(&program, &[], 1), Err(EvaluationFault::BadOperand { pc: 0 }));

        let program = [Op::constant(1.0), Op::new(ops::IF, 100)];
        assert_eq!(run(&program, &[], 1), Err(EvaluationFault::BadOperand { pc: 1 }));

        let program = [Op::new(ops::CURV, 0)];
        assert_eq!(
            run(&program, &[], 1),
            Err(EvaluationFault::BadSubElement { pc: 0, index: 0 })
        );
    }

    #[test]
    fn test_budget() {
        let program: Vec<Op> = (0..10).map(|_| Op::constant(0.0)).collect();
        let mut ctx = ApplyContext::default().with_limits(5, 16);
        let mut out = [0.0f32];
        assert_eq!(
            execute(&program, &[], 0, &mut ctx, &mut out, &[]),
            Err(EvaluationFault::InstructionBudget(5))
        );
    }

    #[test]
    fn test_overflow() {
        let program = [Op::constant(1.0), Op::with_st(ops::COPY, 0, 5000)];
        assert_eq!(run(&program, &[], 1), Err(EvaluationFault::StackOverflow { pc: 1 }));
    }

    #[test]
    fn test_check_branches() {
        // The else branch leaves nothing for 'out', so the program may underflow
        let program = [
            Op::with_st(ops::IN, 0, 0),
            Op::new(ops::IF, 1),
            Op::constant(1.0),
            Op::with_st(ops::OUT, 0, 0),
        ];
        let fault = check(&program, &[], 1, 1).unwrap_err();
        assert_eq!(fault.pc, 3);

        let program = [
            Op::with_st(ops::IN, 0, 0),
            Op::new(ops::IF, 1),
            Op::new(ops::ELSE, 1),
            Op::constant(1.0),
            Op::constant(2.0),
            Op::with_st(ops::OUT, 0, 0),
        ];
        let shape = check(&program, &[], 1, 1).unwrap();
        assert_eq!(shape.max_stack, 1);
        assert_eq!(shape.min_final, 0);
    }

    #[test]
    fn test_check_rejects_out_of_range_channels() {
        let program = [Op::with_st(ops::IN, 0, 3)];
        assert!(check(&program, &[], 2, 1).is_err());
        let program = [Op::new(sig_unknown(), 0)];
        assert!(check(&program, &[], 0, 0).is_err());
    }

    fn sig_unknown() -> u32 {
        u32::from_be_bytes(*b"zzzz")
    }
}
