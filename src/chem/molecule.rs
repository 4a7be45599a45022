//! Molecular graph representation for SMILES-derived ligands.

/// A chemical element, with the data the embedding and force field need.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Element {
    pub atomic_number: u8,
    pub symbol: &'static str,
    pub atomic_weight: f64,
    pub valence: u8,
}

/// Elements that occur in the PFAS screening sheets. Anything outside this
/// set fails SMILES parsing rather than silently degrading geometry.
static ELEMENTS: [Element; 13] = [
    Element { atomic_number: 1, symbol: "H", atomic_weight: 1.008, valence: 1 },
    Element { atomic_number: 5, symbol: "B", atomic_weight: 10.81, valence: 3 },
    Element { atomic_number: 6, symbol: "C", atomic_weight: 12.011, valence: 4 },
    Element { atomic_number: 7, symbol: "N", atomic_weight: 14.007, valence: 3 },
    Element { atomic_number: 8, symbol: "O", atomic_weight: 15.999, valence: 2 },
    Element { atomic_number: 9, symbol: "F", atomic_weight: 18.998, valence: 1 },
    Element { atomic_number: 14, symbol: "Si", atomic_weight: 28.086, valence: 4 },
    Element { atomic_number: 15, symbol: "P", atomic_weight: 30.974, valence: 3 },
    Element { atomic_number: 16, symbol: "S", atomic_weight: 32.06, valence: 2 },
    Element { atomic_number: 17, symbol: "Cl", atomic_weight: 35.45, valence: 1 },
    Element { atomic_number: 35, symbol: "Br", atomic_weight: 79.904, valence: 1 },
    Element { atomic_number: 53, symbol: "I", atomic_weight: 126.904, valence: 1 },
    Element { atomic_number: 34, symbol: "Se", atomic_weight: 78.96, valence: 2 },
];

pub fn element_by_symbol(symbol: &str) -> Option<&'static Element> {
    ELEMENTS.iter().find(|element| element.symbol == symbol)
}

pub fn element_by_number(atomic_number: u8) -> Option<&'static Element> {
    ELEMENTS
        .iter()
        .find(|element| element.atomic_number == atomic_number)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondOrder {
    /// Numeric bond order for valence calculations.
    pub fn as_f64(self) -> f64 {
        match self {
            BondOrder::Single => 1.0,
            BondOrder::Double => 2.0,
            BondOrder::Triple => 3.0,
            BondOrder::Aromatic => 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MolAtom {
    pub atomic_number: u8,
    pub formal_charge: i8,
    pub is_aromatic: bool,
    pub implicit_hydrogens: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bond {
    pub atom1: usize,
    pub atom2: usize,
    pub order: BondOrder,
}

/// A molecular graph with adjacency built from the bond list.
#[derive(Debug, Clone)]
pub struct Molecule {
    pub name: String,
    pub atoms: Vec<MolAtom>,
    pub bonds: Vec<Bond>,
    /// adjacency[atom] = (neighbor atom index, bond index)
    pub adjacency: Vec<Vec<(usize, usize)>>,
}

impl Molecule {
    pub fn new(name: String, atoms: Vec<MolAtom>, bonds: Vec<Bond>) -> Self {
        let mut adjacency = vec![Vec::new(); atoms.len()];
        for (bond_index, bond) in bonds.iter().enumerate() {
            adjacency[bond.atom1].push((bond.atom2, bond_index));
            adjacency[bond.atom2].push((bond.atom1, bond_index));
        }
        Self {
            name,
            atoms,
            bonds,
            adjacency,
        }
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    pub fn heavy_atom_count(&self) -> usize {
        self.atoms
            .iter()
            .filter(|atom| atom.atomic_number != 1)
            .count()
    }

    pub fn degree(&self, atom: usize) -> usize {
        self.adjacency[atom].len()
    }

    /// Convert every implicit hydrogen into an explicit H atom bonded to
    /// its parent, as the geometry steps need all atoms in the graph.
    pub fn with_explicit_hydrogens(&self) -> Molecule {
        let mut atoms = self.atoms.clone();
        let mut bonds = self.bonds.clone();
        for index in 0..self.atoms.len() {
            for _ in 0..self.atoms[index].implicit_hydrogens {
                let hydrogen_index = atoms.len();
                atoms.push(MolAtom {
                    atomic_number: 1,
                    formal_charge: 0,
                    is_aromatic: false,
                    implicit_hydrogens: 0,
                });
                bonds.push(Bond {
                    atom1: index,
                    atom2: hydrogen_index,
                    order: BondOrder::Single,
                });
            }
            atoms[index].implicit_hydrogens = 0;
        }
        Molecule::new(self.name.clone(), atoms, bonds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ethanol() -> Molecule {
        let atoms = vec![
            MolAtom { atomic_number: 6, formal_charge: 0, is_aromatic: false, implicit_hydrogens: 3 },
            MolAtom { atomic_number: 6, formal_charge: 0, is_aromatic: false, implicit_hydrogens: 2 },
            MolAtom { atomic_number: 8, formal_charge: 0, is_aromatic: false, implicit_hydrogens: 1 },
        ];
        let bonds = vec![
            Bond { atom1: 0, atom2: 1, order: BondOrder::Single },
            Bond { atom1: 1, atom2: 2, order: BondOrder::Single },
        ];
        Molecule::new("ethanol".to_string(), atoms, bonds)
    }

    #[test]
    fn adjacency_and_degree() {
        let mol = ethanol();
        assert_eq!(mol.atom_count(), 3);
        assert_eq!(mol.degree(1), 2);
        assert_eq!(mol.heavy_atom_count(), 3);
    }

    #[test]
    fn explicit_hydrogens_expand_graph() {
        let mol = ethanol().with_explicit_hydrogens();
        assert_eq!(mol.atom_count(), 9);
        assert_eq!(mol.bond_count(), 8);
        assert!(mol.atoms.iter().all(|atom| atom.implicit_hydrogens == 0));
    }

    #[test]
    fn element_lookup() {
        assert_eq!(element_by_symbol("F").unwrap().atomic_number, 9);
        assert_eq!(element_by_number(6).unwrap().symbol, "C");
        assert!(element_by_symbol("Zz").is_none());
    }
}
