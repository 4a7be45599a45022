//! SMILES parser for the organic subset plus bracket atoms.
//!
//! Covers what the screening sheets actually contain: element symbols,
//! branches, ring closures (including `%nn`), bond symbols, charges, and
//! explicit hydrogen counts. Stereo markers are consumed and ignored.

use std::collections::BTreeMap;

use crate::chem::molecule::{Bond, BondOrder, MolAtom, Molecule, element_by_symbol};
use crate::domain::Smiles;
use crate::error::PipelineError;

pub fn parse_smiles(smiles: &Smiles, name: &str) -> Result<Molecule, PipelineError> {
    let mut parser = SmilesParser::new(smiles.as_str());
    parser.parse()?;
    parser.check_ring_closures()?;
    parser.compute_implicit_hydrogens();
    Ok(Molecule::new(
        name.to_string(),
        parser.atoms,
        parser.bonds,
    ))
}

struct SmilesParser<'a> {
    input: &'a [u8],
    pos: usize,
    atoms: Vec<MolAtom>,
    bonds: Vec<Bond>,
    /// Atoms whose implicit hydrogen count was fixed by a bracket.
    bracket_atoms: Vec<bool>,
    /// open ring closures: digit -> (atom index, pending bond order)
    ring_closures: BTreeMap<u16, (usize, Option<BondOrder>)>,
    stack: Vec<usize>,
    prev_atom: Option<usize>,
    pending_bond: Option<BondOrder>,
}

impl<'a> SmilesParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
            atoms: Vec::new(),
            bonds: Vec::new(),
            bracket_atoms: Vec::new(),
            ring_closures: BTreeMap::new(),
            stack: Vec::new(),
            prev_atom: None,
            pending_bond: None,
        }
    }

    fn error(&self, message: impl Into<String>) -> PipelineError {
        PipelineError::Chem(format!(
            "SMILES parse failed at position {}: {}",
            self.pos,
            message.into()
        ))
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn parse(&mut self) -> Result<(), PipelineError> {
        while self.pos < self.input.len() {
            match self.peek() {
                Some(b'(') => {
                    self.advance();
                    match self.prev_atom {
                        Some(prev) => self.stack.push(prev),
                        None => return Err(self.error("branch with no preceding atom")),
                    }
                }
                Some(b')') => {
                    self.advance();
                    self.prev_atom = self.stack.pop();
                    self.pending_bond = None;
                }
                Some(b'-') => {
                    self.advance();
                    self.pending_bond = Some(BondOrder::Single);
                }
                Some(b'=') => {
                    self.advance();
                    self.pending_bond = Some(BondOrder::Double);
                }
                Some(b'#') => {
                    self.advance();
                    self.pending_bond = Some(BondOrder::Triple);
                }
                Some(b':') => {
                    self.advance();
                    self.pending_bond = Some(BondOrder::Aromatic);
                }
                Some(b'/') | Some(b'\\') => {
                    self.advance();
                }
                Some(b'%') => {
                    self.advance();
                    let first = self.advance();
                    let second = self.advance();
                    let (Some(first), Some(second)) = (first, second) else {
                        return Err(self.error("truncated %nn ring closure"));
                    };
                    if !first.is_ascii_digit() || !second.is_ascii_digit() {
                        return Err(self.error("%nn ring closure needs two digits"));
                    }
                    let ring = (first - b'0') as u16 * 10 + (second - b'0') as u16;
                    self.handle_ring_closure(ring)?;
                }
                Some(b'[') => self.parse_bracket_atom()?,
                Some(ch) if ch.is_ascii_digit() => {
                    self.advance();
                    self.handle_ring_closure((ch - b'0') as u16)?;
                }
                Some(b'.') => {
                    self.advance();
                    self.prev_atom = None;
                    self.pending_bond = None;
                }
                Some(ch) if is_organic_atom_start(ch) => self.parse_organic_atom()?,
                Some(ch) => {
                    return Err(self.error(format!("unexpected character '{}'", ch as char)));
                }
                None => break,
            }
        }
        Ok(())
    }

    fn parse_organic_atom(&mut self) -> Result<(), PipelineError> {
        let ch = self.advance().ok_or_else(|| self.error("unexpected end"))?;
        let is_aromatic = ch.is_ascii_lowercase();
        let upper = ch.to_ascii_uppercase();

        let symbol = match upper {
            b'B' if !is_aromatic && self.peek() == Some(b'r') => {
                self.advance();
                "Br"
            }
            b'B' => "B",
            b'C' if !is_aromatic && self.peek() == Some(b'l') => {
                self.advance();
                "Cl"
            }
            b'C' => "C",
            b'N' => "N",
            b'O' => "O",
            b'P' => "P",
            b'S' if !is_aromatic && self.peek() == Some(b'i') => {
                self.advance();
                "Si"
            }
            b'S' => "S",
            b'F' => "F",
            b'I' => "I",
            other => {
                return Err(self.error(format!("unknown organic atom '{}'", other as char)));
            }
        };

        let element = element_by_symbol(symbol)
            .ok_or_else(|| self.error(format!("unknown element '{symbol}'")))?;
        let atom_index = self.atoms.len();
        self.atoms.push(MolAtom {
            atomic_number: element.atomic_number,
            formal_charge: 0,
            is_aromatic,
            implicit_hydrogens: 0,
        });
        self.bracket_atoms.push(false);
        self.bond_to_prev(atom_index)?;
        self.prev_atom = Some(atom_index);
        Ok(())
    }

    fn parse_bracket_atom(&mut self) -> Result<(), PipelineError> {
        self.advance(); // '['

        // optional isotope, not retained
        while self.peek().map(|ch| ch.is_ascii_digit()).unwrap_or(false) {
            self.advance();
        }

        let ch = self
            .advance()
            .ok_or_else(|| self.error("unterminated bracket atom"))?;
        let is_aromatic = ch.is_ascii_lowercase();
        let upper = ch.to_ascii_uppercase();

        let symbol = match self.peek() {
            Some(next) if next.is_ascii_lowercase() && next != b'@' => {
                let two_letter = format!("{}{}", upper as char, next as char);
                if element_by_symbol(&two_letter).is_some() {
                    self.advance();
                    two_letter
                } else {
                    (upper as char).to_string()
                }
            }
            _ => (upper as char).to_string(),
        };
        let element = element_by_symbol(&symbol)
            .ok_or_else(|| self.error(format!("unknown element '{symbol}'")))?;

        while self.peek() == Some(b'@') {
            self.advance();
        }

        let mut explicit_hydrogens = 0u8;
        if self.peek() == Some(b'H') {
            self.advance();
            explicit_hydrogens = match self.peek() {
                Some(digit) if digit.is_ascii_digit() => {
                    self.advance();
                    digit - b'0'
                }
                _ => 1,
            };
        }

        let mut formal_charge = 0i8;
        while let Some(sign @ (b'+' | b'-')) = self.peek() {
            self.advance();
            let unit: i8 = if sign == b'+' { 1 } else { -1 };
            match self.peek() {
                Some(digit) if digit.is_ascii_digit() => {
                    self.advance();
                    formal_charge += unit * (digit - b'0') as i8;
                }
                _ => formal_charge += unit,
            }
        }

        if self.advance() != Some(b']') {
            return Err(self.error("unterminated bracket atom"));
        }

        let atom_index = self.atoms.len();
        self.atoms.push(MolAtom {
            atomic_number: element.atomic_number,
            formal_charge,
            is_aromatic,
            implicit_hydrogens: explicit_hydrogens,
        });
        self.bracket_atoms.push(true);
        self.bond_to_prev(atom_index)?;
        self.prev_atom = Some(atom_index);
        Ok(())
    }

    fn handle_ring_closure(&mut self, ring: u16) -> Result<(), PipelineError> {
        let current = self
            .prev_atom
            .ok_or_else(|| self.error("ring closure with no preceding atom"))?;
        match self.ring_closures.remove(&ring) {
            Some((partner, opening_bond)) => {
                if partner == current {
                    return Err(self.error(format!("ring {ring} closes onto its own atom")));
                }
                let order = self
                    .pending_bond
                    .take()
                    .or(opening_bond)
                    .unwrap_or(default_order(&self.atoms, partner, current));
                self.bonds.push(Bond {
                    atom1: partner,
                    atom2: current,
                    order,
                });
            }
            None => {
                self.ring_closures
                    .insert(ring, (current, self.pending_bond.take()));
            }
        }
        Ok(())
    }

    fn check_ring_closures(&self) -> Result<(), PipelineError> {
        if let Some((&ring, _)) = self.ring_closures.iter().next() {
            return Err(PipelineError::Chem(format!(
                "SMILES parse failed: unclosed ring bond {ring}"
            )));
        }
        Ok(())
    }

    fn bond_to_prev(&mut self, atom_index: usize) -> Result<(), PipelineError> {
        if let Some(prev) = self.prev_atom {
            let order = self
                .pending_bond
                .take()
                .unwrap_or(default_order(&self.atoms, prev, atom_index));
            self.bonds.push(Bond {
                atom1: prev,
                atom2: atom_index,
                order,
            });
        } else {
            self.pending_bond = None;
        }
        Ok(())
    }

    /// Fill valence with implicit hydrogens for organic-subset atoms.
    /// Bracket atoms keep exactly the hydrogen count they declared.
    fn compute_implicit_hydrogens(&mut self) {
        let mut order_sums = vec![0.0f64; self.atoms.len()];
        for bond in &self.bonds {
            order_sums[bond.atom1] += bond.order.as_f64();
            order_sums[bond.atom2] += bond.order.as_f64();
        }
        for (index, atom) in self.atoms.iter_mut().enumerate() {
            if self.bracket_atoms[index] {
                continue;
            }
            let valence = crate::chem::molecule::element_by_number(atom.atomic_number)
                .map(|element| element.valence as f64)
                .unwrap_or(0.0);
            let used = order_sums[index].ceil();
            let free = valence - used + atom.formal_charge.max(0) as f64;
            atom.implicit_hydrogens = if free > 0.0 { free as u8 } else { 0 };
        }
    }
}

fn default_order(atoms: &[MolAtom], atom1: usize, atom2: usize) -> BondOrder {
    if atoms[atom1].is_aromatic && atoms[atom2].is_aromatic {
        BondOrder::Aromatic
    } else {
        BondOrder::Single
    }
}

fn is_organic_atom_start(ch: u8) -> bool {
    matches!(
        ch,
        b'B' | b'C' | b'N' | b'O' | b'P' | b'S' | b'F' | b'I' | b'b' | b'c' | b'n' | b'o' | b'p'
            | b's'
    )
}
