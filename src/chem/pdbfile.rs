//! PDB coordinate file writer (and a minimal reader for round-trips).
//!
//! Small-molecule output: one HETATM record per atom in a single UNL
//! residue, CONECT records per bond, fixed column layout.

use std::fs;

use camino::Utf8Path;

use crate::chem::embed::Coordinates;
use crate::chem::molecule::{Molecule, element_by_number};
use crate::error::PipelineError;

pub fn render_pdb(mol: &Molecule, coords: &Coordinates) -> Result<String, PipelineError> {
    if coords.len() != mol.atom_count() {
        return Err(PipelineError::Chem(format!(
            "coordinate count {} does not match atom count {}",
            coords.len(),
            mol.atom_count()
        )));
    }

    let mut out = String::new();
    if !mol.name.is_empty() {
        out.push_str(&format!("COMPND    {}\n", mol.name));
    }

    let mut element_counts = std::collections::HashMap::new();
    for (index, atom) in mol.atoms.iter().enumerate() {
        let element = element_by_number(atom.atomic_number)
            .map(|element| element.symbol)
            .ok_or_else(|| {
                PipelineError::Chem(format!("no element for atomic number {}", atom.atomic_number))
            })?;
        let count = element_counts
            .entry(element)
            .and_modify(|count| *count += 1)
            .or_insert(1usize)
            .to_owned();
        let atom_name = format!("{}{}", element, count);
        let [x, y, z] = coords[index];
        // Fixed HETATM column layout.
        out.push_str(&format!(
            "HETATM{:>5} {:<4} UNL A   1    {:>8.3}{:>8.3}{:>8.3}{:>6.2}{:>6.2}          {:>2}\n",
            index + 1,
            atom_name,
            x,
            y,
            z,
            1.00,
            0.00,
            element,
        ));
    }

    for bond in &mol.bonds {
        out.push_str(&format!(
            "CONECT{:>5}{:>5}\n",
            bond.atom1 + 1,
            bond.atom2 + 1
        ));
    }
    out.push_str("END\n");
    Ok(out)
}

pub fn write_pdb(
    mol: &Molecule,
    coords: &Coordinates,
    path: &Utf8Path,
) -> Result<(), PipelineError> {
    let content = render_pdb(mol, coords)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    }
    fs::write(path.as_std_path(), content)
        .map_err(|err| PipelineError::Filesystem(err.to_string()))
}

/// A parsed HETATM record; just enough to verify written output.
#[derive(Debug, Clone, PartialEq)]
pub struct PdbAtom {
    pub serial: usize,
    pub element: String,
    pub position: [f64; 3],
}

pub fn parse_pdb_atoms(content: &str) -> Result<Vec<PdbAtom>, PipelineError> {
    let mut atoms = Vec::new();
    for line in content.lines() {
        if !line.starts_with("HETATM") && !line.starts_with("ATOM") {
            continue;
        }
        if line.len() < 54 {
            return Err(PipelineError::Chem(format!("short atom record: {line}")));
        }
        let serial = line[6..11]
            .trim()
            .parse::<usize>()
            .map_err(|err| PipelineError::Chem(format!("bad atom serial: {err}")))?;
        let parse_coord = |range: std::ops::Range<usize>| {
            line[range.clone()]
                .trim()
                .parse::<f64>()
                .map_err(|err| PipelineError::Chem(format!("bad coordinate: {err}")))
        };
        let x = parse_coord(30..38)?;
        let y = parse_coord(38..46)?;
        let z = parse_coord(46..54)?;
        let element = if line.len() >= 78 {
            line[76..78].trim().to_string()
        } else {
            String::new()
        };
        atoms.push(PdbAtom {
            serial,
            element,
            position: [x, y, z],
        });
    }
    Ok(atoms)
}

#[cfg(test)]
mod tests {
    use crate::chem::embed::{DEFAULT_SEED, embed_molecule};
    use crate::chem::smiles::parse_smiles;

    use super::*;

    #[test]
    fn round_trip_atom_count() {
        let mol = parse_smiles(&"C(F)(F)(F)C(=O)O".parse().unwrap(), "TFA")
            .unwrap()
            .with_explicit_hydrogens();
        let coords = embed_molecule(&mol, DEFAULT_SEED).unwrap();
        let content = render_pdb(&mol, &coords).unwrap();

        let atoms = parse_pdb_atoms(&content).unwrap();
        assert_eq!(atoms.len(), mol.atom_count());
        assert_eq!(atoms[0].serial, 1);
        assert_eq!(
            content.matches("CONECT").count(),
            mol.bond_count(),
            "one CONECT record per bond"
        );
        assert!(content.ends_with("END\n"));
    }

    #[test]
    fn hetatm_columns_are_fixed() {
        let mol = parse_smiles(&"O".parse().unwrap(), "water")
            .unwrap()
            .with_explicit_hydrogens();
        let coords = embed_molecule(&mol, DEFAULT_SEED).unwrap();
        let content = render_pdb(&mol, &coords).unwrap();
        let line = content
            .lines()
            .find(|line| line.starts_with("HETATM"))
            .unwrap();
        let atoms = parse_pdb_atoms(&content).unwrap();
        assert_eq!(&line[17..20], "UNL");
        assert_eq!(atoms[0].element, "O");
    }
}
