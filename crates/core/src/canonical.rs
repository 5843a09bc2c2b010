use serde::{Deserialize, Serialize};

/// Closed set of item families the advisor can rule on. Decoding an unknown
/// key is an error, never a passthrough string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Canonical {
    // aerosols
    AerosolToiletry,
    AerosolNonToiletry,
    SprayPaint,
    BearSprayCapsaicin,
    CompressedGasSpray,
    // liquids, gels, alcohol
    CosmeticsLiquid,
    Perfume,
    NailPolish,
    NailPolishRemoverAcetone,
    HandSanitizerAlcohol,
    MedicineLiquid,
    FoodLiquid,
    AlcoholBeverage,
    #[serde(rename = "alcohol_over_70_percent")]
    AlcoholOver70Percent,
    DutyFreeLiquidsSteb,
    // batteries
    LithiumBatterySpare,
    LithiumBatteryInstalled,
    PowerBank,
    SmartLuggageBattery,
    EBikeScooterBattery,
    WheelchairBattery,
    PowerToolBattery,
    ButtonCellBattery,
    NiMhNicdBattery,
    WetCellBattery,
    HeatToolSolderingIron,
    // cold cargo
    DryIce,
    // blades and tools
    Knife,
    Scissors,
    MultiTool,
    BoxCutter,
    RazorBlade,
    SportingBatClub,
    MartialArtsEquipment,
    PowerDrillTool,
    // gas and ignition
    Co2CartridgeSmall,
    OxygenCylinderMedical,
    ScubaTank,
    CampingGasCanister,
    Lighter,
    TorchLighter,
    ECigaretteDevice,
    SafetyMatches,
    // flammables
    FlammableLiquidFuel,
    PaintSolvent,
    FuelStoveCamping,
    EnginePoweredEquipment,
    InsecticidePesticide,
    // pyrotechnics
    Fireworks,
    SignalFlare,
    PartyPopper,
    ChristmasCracker,
    // weapons
    Firearm,
    Ammunition,
    ReplicaWeapon,
    StunGun,
    PepperSprayDefense,
    // corrosives and chemicals
    CorrosiveChemical,
    BleachCleaner,
    DrainCleaner,
    MercuryThermometer,
    // fields, radiation, biology
    StrongMagnet,
    RadioactiveMaterial,
    InfectiousSubstance,
    BiologicalSpecimen,
    // special equipment
    AvalancheRescueBackpack,
    ChemicalOxygenGenerator,
    CarBatteryWet,
    DroneWithBattery,
    SelfBalancingScooter,
    // sentinel for everyday items
    BenignGeneral,
}

impl Canonical {
    pub const ALL: &'static [Canonical] = &[
        Self::AerosolToiletry,
        Self::AerosolNonToiletry,
        Self::SprayPaint,
        Self::BearSprayCapsaicin,
        Self::CompressedGasSpray,
        Self::CosmeticsLiquid,
        Self::Perfume,
        Self::NailPolish,
        Self::NailPolishRemoverAcetone,
        Self::HandSanitizerAlcohol,
        Self::MedicineLiquid,
        Self::FoodLiquid,
        Self::AlcoholBeverage,
        Self::AlcoholOver70Percent,
        Self::DutyFreeLiquidsSteb,
        Self::LithiumBatterySpare,
        Self::LithiumBatteryInstalled,
        Self::PowerBank,
        Self::SmartLuggageBattery,
        Self::EBikeScooterBattery,
        Self::WheelchairBattery,
        Self::PowerToolBattery,
        Self::ButtonCellBattery,
        Self::NiMhNicdBattery,
        Self::WetCellBattery,
        Self::HeatToolSolderingIron,
        Self::DryIce,
        Self::Knife,
        Self::Scissors,
        Self::MultiTool,
        Self::BoxCutter,
        Self::RazorBlade,
        Self::SportingBatClub,
        Self::MartialArtsEquipment,
        Self::PowerDrillTool,
        Self::Co2CartridgeSmall,
        Self::OxygenCylinderMedical,
        Self::ScubaTank,
        Self::CampingGasCanister,
        Self::Lighter,
        Self::TorchLighter,
        Self::ECigaretteDevice,
        Self::SafetyMatches,
        Self::FlammableLiquidFuel,
        Self::PaintSolvent,
        Self::FuelStoveCamping,
        Self::EnginePoweredEquipment,
        Self::InsecticidePesticide,
        Self::Fireworks,
        Self::SignalFlare,
        Self::PartyPopper,
        Self::ChristmasCracker,
        Self::Firearm,
        Self::Ammunition,
        Self::ReplicaWeapon,
        Self::StunGun,
        Self::PepperSprayDefense,
        Self::CorrosiveChemical,
        Self::BleachCleaner,
        Self::DrainCleaner,
        Self::MercuryThermometer,
        Self::StrongMagnet,
        Self::RadioactiveMaterial,
        Self::InfectiousSubstance,
        Self::BiologicalSpecimen,
        Self::AvalancheRescueBackpack,
        Self::ChemicalOxygenGenerator,
        Self::CarBatteryWet,
        Self::DroneWithBattery,
        Self::SelfBalancingScooter,
        Self::BenignGeneral,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(value.trim().to_string())).ok()
    }

    pub fn as_key(self) -> &'static str {
        // The serde rename table is the one source for key spellings.
        Self::ALL
            .iter()
            .zip(Self::KEYS.iter())
            .find(|(variant, _)| **variant == self)
            .map(|(_, key)| *key)
            .unwrap_or("benign_general")
    }

    const KEYS: &'static [&'static str] = &[
        "aerosol_toiletry",
        "aerosol_non_toiletry",
        "spray_paint",
        "bear_spray_capsaicin",
        "compressed_gas_spray",
        "cosmetics_liquid",
        "perfume",
        "nail_polish",
        "nail_polish_remover_acetone",
        "hand_sanitizer_alcohol",
        "medicine_liquid",
        "food_liquid",
        "alcohol_beverage",
        "alcohol_over_70_percent",
        "duty_free_liquids_steb",
        "lithium_battery_spare",
        "lithium_battery_installed",
        "power_bank",
        "smart_luggage_battery",
        "e_bike_scooter_battery",
        "wheelchair_battery",
        "power_tool_battery",
        "button_cell_battery",
        "ni_mh_nicd_battery",
        "wet_cell_battery",
        "heat_tool_soldering_iron",
        "dry_ice",
        "knife",
        "scissors",
        "multi_tool",
        "box_cutter",
        "razor_blade",
        "sporting_bat_club",
        "martial_arts_equipment",
        "power_drill_tool",
        "co2_cartridge_small",
        "oxygen_cylinder_medical",
        "scuba_tank",
        "camping_gas_canister",
        "lighter",
        "torch_lighter",
        "e_cigarette_device",
        "safety_matches",
        "flammable_liquid_fuel",
        "paint_solvent",
        "fuel_stove_camping",
        "engine_powered_equipment",
        "insecticide_pesticide",
        "fireworks",
        "signal_flare",
        "party_popper",
        "christmas_cracker",
        "firearm",
        "ammunition",
        "replica_weapon",
        "stun_gun",
        "pepper_spray_defense",
        "corrosive_chemical",
        "bleach_cleaner",
        "drain_cleaner",
        "mercury_thermometer",
        "strong_magnet",
        "radioactive_material",
        "infectious_substance",
        "biological_specimen",
        "avalanche_rescue_backpack",
        "chemical_oxygen_generator",
        "car_battery_wet",
        "drone_with_battery",
        "self_balancing_scooter",
        "benign_general",
    ];
}
