//! Catalog of solid materials and fluids, and the friction between materials.

use crate::{fph, name::NameManager};
use anyhow::{Result, anyhow, bail};
use bytemuck::{Pod, Zeroable};
use std::collections::HashMap;

/// Index of a [`Material`] in a [`MaterialManager`].
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Zeroable, Pod)]
pub struct MaterialID(u32);

/// Index of a [`Fluid`] in a [`MaterialManager`].
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Zeroable, Pod)]
pub struct FluidID(u32);

/// A solid material.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    /// Mass density [kg/m^3].
    pub density: fph,
    /// Elasticity of collisions, between 0 (fully inelastic) and 1 (elastic).
    pub restitution: fph,
}

/// A fluid that bodies can be immersed in.
#[derive(Clone, Debug, PartialEq)]
pub struct Fluid {
    pub name: String,
    /// Mass density [kg/m^3].
    pub density: fph,
    /// Dynamic viscosity [Pa s].
    pub viscosity: fph,
    pub refractive_index: fph,
}

/// Friction coefficients between two materials.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Friction {
    /// Friction when the touching surfaces are not sliding across each other.
    pub static_friction: fph,
    /// Friction when the touching surfaces are sliding across each other.
    pub dynamic_friction: fph,
}

/// Owns all materials and fluids of a scenario together with the table of
/// friction coefficients between pairs of materials.
#[derive(Clone, Debug, Default)]
pub struct MaterialManager {
    materials: Vec<Material>,
    fluids: Vec<Fluid>,
    interactions: HashMap<(MaterialID, MaterialID), Friction>,
    material_names: NameManager,
    fluid_names: NameManager,
}

impl MaterialID {
    pub fn idx(&self) -> usize {
        self.0 as usize
    }
}

impl FluidID {
    pub fn idx(&self) -> usize {
        self.0 as usize
    }
}

impl Fluid {
    /// Fresh water at room temperature.
    pub fn water() -> Self {
        Self {
            name: "Water".to_owned(),
            density: 1000.0,
            viscosity: 1.002e-3,
            refractive_index: 1.33,
        }
    }

    /// Sea water at 15 degrees Celsius.
    pub fn sea_water() -> Self {
        Self {
            name: "SeaWater".to_owned(),
            density: 1025.0,
            viscosity: 1.22e-3,
            refractive_index: 1.34,
        }
    }

    /// Earth air at sea level and room temperature.
    pub fn air() -> Self {
        Self {
            name: "Air".to_owned(),
            density: 1.2,
            viscosity: 1.81e-5,
            refractive_index: 1.000_293,
        }
    }
}

impl Friction {
    pub const fn new(static_friction: fph, dynamic_friction: fph) -> Self {
        Self {
            static_friction,
            dynamic_friction,
        }
    }
}

impl Default for Friction {
    /// The friction used for material pairs without an explicit interaction.
    fn default() -> Self {
        Self::new(0.5, 0.2)
    }
}

impl MaterialManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a material and returns its unique (possibly suffixed) name.
    ///
    /// # Errors
    /// Returns an error if the density is not positive or the restitution is
    /// outside `[0, 1]`.
    pub fn create_material(
        &mut self,
        name: &str,
        density: fph,
        restitution: fph,
    ) -> Result<String> {
        if !(density > 0.0) {
            bail!("Invalid density for material {name}: {density}");
        }
        if !(0.0..=1.0).contains(&restitution) {
            bail!("Invalid restitution for material {name}: {restitution}");
        }
        let name = self.material_names.add_name(name);
        log::debug!("Creating material {name} (density {density}, restitution {restitution})");
        self.materials.push(Material {
            name: name.clone(),
            density,
            restitution,
        });
        Ok(name)
    }

    /// Adds a fluid and returns its unique (possibly suffixed) name.
    ///
    /// # Errors
    /// Returns an error if the density is not positive or the viscosity is
    /// negative.
    pub fn create_fluid(
        &mut self,
        name: &str,
        density: fph,
        viscosity: fph,
        refractive_index: fph,
    ) -> Result<String> {
        if !(density > 0.0) {
            bail!("Invalid density for fluid {name}: {density}");
        }
        if !(viscosity >= 0.0) {
            bail!("Invalid viscosity for fluid {name}: {viscosity}");
        }
        let name = self.fluid_names.add_name(name);
        log::debug!("Creating fluid {name} (density {density}, viscosity {viscosity})");
        self.fluids.push(Fluid {
            name: name.clone(),
            density,
            viscosity,
            refractive_index,
        });
        Ok(name)
    }

    /// Sets the friction between the two named materials, overwriting any
    /// previous value for the pair in either order.
    ///
    /// # Returns
    /// `false` if either material is unknown.
    pub fn set_materials_interaction(
        &mut self,
        name_a: &str,
        name_b: &str,
        static_friction: fph,
        dynamic_friction: fph,
    ) -> bool {
        let (Some(id_a), Some(id_b)) = (self.material_id(name_a), self.material_id(name_b))
        else {
            log::warn!("Cannot set interaction between unknown materials {name_a} and {name_b}");
            return false;
        };
        self.interactions.insert(
            ordered_pair(id_a, id_b),
            Friction::new(static_friction, dynamic_friction),
        );
        true
    }

    /// Returns the friction between the two materials. Pairs without an
    /// explicit interaction get [`Friction::default`].
    pub fn materials_interaction(&self, id_a: MaterialID, id_b: MaterialID) -> Friction {
        self.interactions
            .get(&ordered_pair(id_a, id_b))
            .copied()
            .unwrap_or_default()
    }

    /// Returns the ID of the material with the given name, if it exists.
    pub fn material_id(&self, name: &str) -> Option<MaterialID> {
        self.materials
            .iter()
            .position(|material| material.name == name)
            .map(|idx| MaterialID(idx as u32))
    }

    /// Returns the ID of the fluid with the given name, if it exists.
    pub fn fluid_id(&self, name: &str) -> Option<FluidID> {
        self.fluids
            .iter()
            .position(|fluid| fluid.name == name)
            .map(|idx| FluidID(idx as u32))
    }

    /// Returns the material with the given ID, or [`None`] if it does not
    /// exist.
    pub fn get_material(&self, id: MaterialID) -> Option<&Material> {
        self.materials.get(id.idx())
    }

    /// Returns the material with the given ID.
    ///
    /// # Errors
    /// Returns an error if no material has the ID.
    pub fn material(&self, id: MaterialID) -> Result<&Material> {
        self.get_material(id)
            .ok_or_else(|| anyhow!("Unknown material with index {}", id.idx()))
    }

    /// Returns the material with the given name.
    ///
    /// # Errors
    /// Returns an error if no material has the name.
    pub fn material_by_name(&self, name: &str) -> Result<&Material> {
        self.material_id(name)
            .and_then(|id| self.get_material(id))
            .ok_or_else(|| anyhow!("Unknown material {name}"))
    }

    /// Returns the fluid with the given ID, or [`None`] if it does not exist.
    pub fn get_fluid(&self, id: FluidID) -> Option<&Fluid> {
        self.fluids.get(id.idx())
    }

    /// Returns the fluid with the given name.
    ///
    /// # Errors
    /// Returns an error if no fluid has the name.
    pub fn fluid_by_name(&self, name: &str) -> Result<&Fluid> {
        self.fluid_id(name)
            .and_then(|id| self.get_fluid(id))
            .ok_or_else(|| anyhow!("Unknown fluid {name}"))
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn fluids(&self) -> &[Fluid] {
        &self.fluids
    }

    /// Removes all materials, fluids and interactions.
    pub fn clear(&mut self) {
        self.materials.clear();
        self.fluids.clear();
        self.interactions.clear();
        self.material_names.clear_names();
        self.fluid_names.clear_names();
    }
}

fn ordered_pair(id_a: MaterialID, id_b: MaterialID) -> (MaterialID, MaterialID) {
    if id_a <= id_b { (id_a, id_b) } else { (id_b, id_a) }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    fn manager_with_materials(count: usize) -> MaterialManager {
        let mut manager = MaterialManager::new();
        for idx in 0..count {
            manager
                .create_material(&format!("Material{idx}"), 1000.0 + idx as fph, 0.5)
                .unwrap();
        }
        manager
    }

    #[test]
    fn creating_material_with_taken_name_suffixes_it() {
        let mut manager = MaterialManager::new();
        assert_eq!(manager.create_material("Steel", 7800.0, 0.3).unwrap(), "Steel");
        assert_eq!(manager.create_material("Steel", 7900.0, 0.3).unwrap(), "Steel1");
        assert_eq!(manager.materials().len(), 2);
        assert_eq!(manager.material_by_name("Steel1").unwrap().density, 7900.0);
    }

    #[test]
    fn creating_material_with_invalid_density_fails() {
        let mut manager = MaterialManager::new();
        assert!(manager.create_material("Void", 0.0, 0.5).is_err());
        assert!(manager.create_material("Void", fph::NAN, 0.5).is_err());
        assert!(manager.materials().is_empty());
    }

    #[test]
    fn interaction_with_unknown_material_is_rejected() {
        let mut manager = manager_with_materials(1);
        assert!(!manager.set_materials_interaction("Material0", "Unobtainium", 0.3, 0.1));
    }

    #[test]
    fn unset_interaction_falls_back_to_default() {
        let manager = manager_with_materials(2);
        let friction = manager.materials_interaction(MaterialID(0), MaterialID(1));
        assert_eq!(friction, Friction::default());
    }

    #[test]
    fn set_interaction_overwrites_pair_in_either_order() {
        let mut manager = manager_with_materials(2);
        assert!(manager.set_materials_interaction("Material0", "Material1", 0.9, 0.7));
        assert!(manager.set_materials_interaction("Material1", "Material0", 0.4, 0.3));
        assert_eq!(
            manager.materials_interaction(MaterialID(0), MaterialID(1)),
            Friction::new(0.4, 0.3)
        );
    }

    #[test]
    fn unknown_material_lookups_report_not_found() {
        let manager = manager_with_materials(1);
        assert!(manager.material(MaterialID(3)).is_err());
        assert!(manager.material_by_name("Rubber").is_err());
        assert!(manager.fluid_by_name("Water").is_err());
    }

    #[test]
    fn fluids_are_cataloged_separately() {
        let mut manager = manager_with_materials(1);
        let name = manager.create_fluid("Water", 1000.0, 1e-3, 1.33).unwrap();
        assert_eq!(name, "Water");
        assert_eq!(manager.create_fluid("Material0", 1.2, 1.8e-5, 1.0).unwrap(), "Material0");
        assert_eq!(manager.fluid_id("Water"), Some(FluidID(0)));
        assert_eq!(manager.fluid_by_name("Water").unwrap().viscosity, 1e-3);
    }

    proptest! {
        #[test]
        fn friction_lookup_is_symmetric(
            interactions in prop::collection::vec(
                (0..5_usize, 0..5_usize, 0.0..1.0, 0.0..1.0),
                0..10,
            ),
            i in 0..5_u32,
            j in 0..5_u32,
        ) {
            let mut manager = manager_with_materials(5);
            for (a, b, static_friction, dynamic_friction) in interactions {
                manager.set_materials_interaction(
                    &format!("Material{a}"),
                    &format!("Material{b}"),
                    static_friction,
                    dynamic_friction,
                );
            }
            prop_assert_eq!(
                manager.materials_interaction(MaterialID(i), MaterialID(j)),
                manager.materials_interaction(MaterialID(j), MaterialID(i))
            );
        }
    }
}
