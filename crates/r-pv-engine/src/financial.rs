//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Cost estimation and multi-year discounted cash-flow analysis."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Financial projection over the project life.
//!
//! Energy degrades and the tariff escalates year over year; revenue net of
//! maintenance is discounted at the interest rate. Tax credits reduce the
//! capital cost once at year zero, land is added on top.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{PvEngineError, Result};

/// Grid emissions avoided per kWh generated (kg CO2).
pub const GRID_EMISSIONS_KG_PER_KWH: f64 = 0.7;

/// Yearly operation and maintenance cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "basis", content = "amount", rename_all = "kebab-case")]
pub enum MaintenanceCost {
    /// $/yr
    Flat(f64),
    /// $/kW-yr of DC nameplate.
    PerKw(f64),
}

impl Default for MaintenanceCost {
    fn default() -> Self {
        MaintenanceCost::PerKw(15.0)
    }
}

impl MaintenanceCost {
    pub fn annual(&self, system_kw: f64) -> f64 {
        match *self {
            MaintenanceCost::Flat(amount) => amount,
            MaintenanceCost::PerKw(rate) => rate * system_kw,
        }
    }

    fn amount(&self) -> f64 {
        match *self {
            MaintenanceCost::Flat(amount) | MaintenanceCost::PerKw(amount) => amount,
        }
    }
}

/// Itemized installed cost in $/W DC.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostComponents {
    pub module: f64,
    pub inverter: f64,
    pub racking: f64,
    pub wiring: f64,
    pub disconnect: f64,
    pub labor: f64,
    pub installation_overhead: f64,
    pub profit: f64,
    pub permitting: f64,
    pub inspection: f64,
    pub interconnection: f64,
    pub soft_overhead: f64,
}

impl Default for CostComponents {
    fn default() -> Self {
        Self {
            module: 0.35,
            inverter: 0.10,
            racking: 0.10,
            wiring: 0.15,
            disconnect: 0.05,
            labor: 0.20,
            installation_overhead: 0.10,
            profit: 0.10,
            permitting: 0.10,
            inspection: 0.05,
            interconnection: 0.10,
            soft_overhead: 0.10,
        }
    }
}

impl CostComponents {
    /// Default prices discounted for larger systems.
    pub fn estimated_for(system_kw: f64) -> Self {
        let scale = (system_kw.max(1.0).log10() / 2.0).clamp(0.0, 1.0);
        let hardware = 1.0 - 0.10 * scale;
        let bos = 1.0 - 0.15 * scale;
        let install = 1.0 - 0.20 * scale;
        let soft = 1.0 - 0.10 * scale;
        let base = Self::default();
        Self {
            module: base.module * hardware,
            inverter: base.inverter * hardware,
            racking: base.racking * bos,
            wiring: base.wiring * bos,
            disconnect: base.disconnect * bos,
            labor: base.labor * install,
            installation_overhead: base.installation_overhead * install,
            profit: base.profit * install,
            permitting: base.permitting * soft,
            inspection: base.inspection * soft,
            interconnection: base.interconnection * soft,
            soft_overhead: base.soft_overhead * soft,
        }
    }

    pub fn per_watt(&self) -> f64 {
        self.values().iter().sum()
    }

    fn values(&self) -> [f64; 12] {
        [
            self.module,
            self.inverter,
            self.racking,
            self.wiring,
            self.disconnect,
            self.labor,
            self.installation_overhead,
            self.profit,
            self.permitting,
            self.inspection,
            self.interconnection,
            self.soft_overhead,
        ]
    }

    pub fn validate(&self) -> Result<()> {
        if self.values().iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(PvEngineError::invalid_input(
                "cost components must be finite and non-negative",
            ));
        }
        Ok(())
    }

    pub fn breakdown(&self, dc_watts: f64, land: f64) -> CostBreakdown {
        CostBreakdown::from_categories(
            self.module * dc_watts,
            self.inverter * dc_watts,
            (self.racking + self.wiring + self.disconnect) * dc_watts,
            (self.labor + self.installation_overhead + self.profit) * dc_watts,
            (self.permitting + self.inspection + self.interconnection + self.soft_overhead)
                * dc_watts,
            land,
        )
    }
}

/// Category totals in $.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub module: f64,
    pub inverter: f64,
    pub balance_of_system: f64,
    pub installation: f64,
    pub soft_costs: f64,
    pub land: f64,
    /// Everything except land.
    pub total_installed: f64,
    pub total: f64,
}

impl CostBreakdown {
    fn from_categories(
        module: f64,
        inverter: f64,
        balance_of_system: f64,
        installation: f64,
        soft_costs: f64,
        land: f64,
    ) -> Self {
        let total_installed = module + inverter + balance_of_system + installation + soft_costs;
        Self {
            module,
            inverter,
            balance_of_system,
            installation,
            soft_costs,
            land,
            total_installed,
            total: total_installed + land,
        }
    }

    /// Split a lump-sum installed cost by the default category shares.
    pub fn apportion(installed: f64, land: f64) -> Self {
        let shares = CostComponents::default();
        let per_watt = shares.per_watt();
        let equivalent_watts = if per_watt > 0.0 { installed / per_watt } else { 0.0 };
        shares.breakdown(equivalent_watts, land)
    }
}

/// How the installed cost is known.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum InstalledCost {
    LumpSum { amount: f64 },
    Itemized(CostComponents),
    /// Default component prices with economies of scale.
    Estimated,
}

/// Rates and credits are fractions (0.05 = 5 %).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinancialInputs {
    /// Year-one AC energy (kWh).
    pub annual_energy: f64,
    /// DC nameplate (kW), used for cost estimation and per-kW maintenance.
    pub system_kw: f64,
    pub installed_cost: InstalledCost,
    /// $/kWh
    pub electricity_rate: f64,
    pub degradation: f64,
    pub price_escalation: f64,
    pub maintenance: MaintenanceCost,
    pub interest_rate: f64,
    pub project_life: u32,
    pub federal_tax_credit: f64,
    pub state_tax_credit: f64,
    pub land_cost: f64,
}

impl Default for FinancialInputs {
    fn default() -> Self {
        Self {
            annual_energy: 0.0,
            system_kw: 0.0,
            installed_cost: InstalledCost::Estimated,
            electricity_rate: 0.10,
            degradation: 0.005,
            price_escalation: 0.025,
            maintenance: MaintenanceCost::default(),
            interest_rate: 0.05,
            project_life: 25,
            federal_tax_credit: 0.0,
            state_tax_credit: 0.0,
            land_cost: 0.0,
        }
    }
}

impl FinancialInputs {
    pub fn validate(&self) -> Result<()> {
        let finite = [
            ("annual_energy", self.annual_energy),
            ("system_size", self.system_kw),
            ("electricity_rate", self.electricity_rate),
            ("degradation", self.degradation),
            ("price_escalation", self.price_escalation),
            ("maintenance_cost", self.maintenance.amount()),
            ("interest_rate", self.interest_rate),
            ("federal_tax_credit", self.federal_tax_credit),
            ("state_tax_credit", self.state_tax_credit),
            ("land_cost", self.land_cost),
        ];
        if let Some((field, value)) = finite.iter().find(|(_, v)| !v.is_finite()) {
            return Err(PvEngineError::invalid_input(format!(
                "{field} must be finite (got {value})"
            )));
        }
        if self.annual_energy < 0.0 || self.system_kw < 0.0 || self.land_cost < 0.0 {
            return Err(PvEngineError::invalid_input(
                "energy, system size and land cost must not be negative",
            ));
        }
        if self.interest_rate <= -1.0 {
            return Err(PvEngineError::invalid_input(format!(
                "interest_rate must exceed -100% (got {:.2}%)",
                self.interest_rate * 100.0
            )));
        }
        if !(1..=100).contains(&self.project_life) {
            return Err(PvEngineError::invalid_input(format!(
                "project_life must lie in 1..=100 years (got {})",
                self.project_life
            )));
        }
        for (field, credit) in [
            ("federal_tax_credit", self.federal_tax_credit),
            ("state_tax_credit", self.state_tax_credit),
        ] {
            if !(0.0..=1.0).contains(&credit) {
                return Err(PvEngineError::invalid_input(format!(
                    "{field} must lie in [0, 100]% (got {:.2}%)",
                    credit * 100.0
                )));
            }
        }
        if self.federal_tax_credit + self.state_tax_credit > 1.0 {
            return Err(PvEngineError::invalid_input(
                "combined tax credits exceed 100%",
            ));
        }
        if self.degradation >= 1.0 {
            return Err(PvEngineError::invalid_input(
                "degradation must be below 100% per year",
            ));
        }
        match self.installed_cost {
            InstalledCost::LumpSum { amount } if !amount.is_finite() || amount < 0.0 => {
                Err(PvEngineError::invalid_input(format!(
                    "installed_cost must be finite and non-negative (got {amount})"
                )))
            }
            InstalledCost::Itemized(components) => components.validate(),
            _ => Ok(()),
        }
    }

    pub fn cost_breakdown(&self) -> CostBreakdown {
        let dc_watts = self.system_kw * 1000.0;
        match self.installed_cost {
            InstalledCost::LumpSum { amount } => CostBreakdown::apportion(amount, self.land_cost),
            InstalledCost::Itemized(components) => components.breakdown(dc_watts, self.land_cost),
            InstalledCost::Estimated => {
                CostComponents::estimated_for(self.system_kw).breakdown(dc_watts, self.land_cost)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialResult {
    /// Year-one energy value ($).
    pub annual_savings: f64,
    /// Years until undiscounted cash flow turns positive; `None` if never.
    pub simple_payback: Option<f64>,
    /// $/kWh; `None` when no energy is produced.
    pub lcoe: Option<f64>,
    #[serde(rename = "net_present_value", alias = "npv")]
    pub npv: f64,
    /// Lifetime avoided emissions (tonnes).
    pub co2_savings: f64,
    /// Year-one avoided emissions (tonnes).
    pub annual_co2_savings: f64,
    /// Discounted, index 0 is year zero.
    pub cumulative_cash_flow: Vec<f64>,
    pub undiscounted_cumulative_cash_flow: Vec<f64>,
    /// Undiscounted net revenue for years 1..=life.
    pub annual_cash_flows: Vec<f64>,
    /// Capital outlay at year zero after credits, including land.
    pub net_cost: f64,
    /// Undiscounted energy value over the project life ($).
    pub total_savings: f64,
    /// kWh
    pub lifetime_energy: f64,
    pub cost_breakdown: CostBreakdown,
}

pub struct FinancialAnalyzer;

impl FinancialAnalyzer {
    pub fn analyze(inputs: &FinancialInputs) -> Result<FinancialResult> {
        inputs.validate()?;
        let cost_breakdown = inputs.cost_breakdown();
        let credits = inputs.federal_tax_credit + inputs.state_tax_credit;
        let net_cost = cost_breakdown.total_installed * (1.0 - credits) + inputs.land_cost;
        let maintenance = inputs.maintenance.annual(inputs.system_kw);
        let life = inputs.project_life as usize;

        let mut cumulative = Vec::with_capacity(life + 1);
        let mut undiscounted = Vec::with_capacity(life + 1);
        let mut annual_cash_flows = Vec::with_capacity(life);
        cumulative.push(-net_cost);
        undiscounted.push(-net_cost);
        let (mut running, mut running_plain) = (-net_cost, -net_cost);
        let mut discounted_energy = 0.0;
        let mut discounted_maintenance = 0.0;
        let mut lifetime_energy = 0.0;
        let mut total_savings = 0.0;

        for t in 1..=inputs.project_life {
            let exponent = (t - 1) as i32;
            let energy = inputs.annual_energy * (1.0 - inputs.degradation).powi(exponent);
            let price = inputs.electricity_rate * (1.0 + inputs.price_escalation).powi(exponent);
            let revenue = energy * price - maintenance;
            let discount = (1.0 + inputs.interest_rate).powi(t as i32);

            running += revenue / discount;
            running_plain += revenue;
            discounted_energy += energy / discount;
            discounted_maintenance += maintenance / discount;
            lifetime_energy += energy;
            total_savings += energy * price;

            cumulative.push(running);
            undiscounted.push(running_plain);
            annual_cash_flows.push(revenue);
        }

        let lcoe = (discounted_energy > 0.0)
            .then(|| (net_cost + discounted_maintenance) / discounted_energy);
        let result = FinancialResult {
            annual_savings: inputs.annual_energy * inputs.electricity_rate,
            simple_payback: payback_year(&undiscounted),
            lcoe,
            npv: running,
            co2_savings: lifetime_energy * GRID_EMISSIONS_KG_PER_KWH / 1000.0,
            annual_co2_savings: inputs.annual_energy * GRID_EMISSIONS_KG_PER_KWH / 1000.0,
            cumulative_cash_flow: cumulative,
            undiscounted_cumulative_cash_flow: undiscounted,
            annual_cash_flows,
            net_cost,
            total_savings,
            lifetime_energy,
            cost_breakdown,
        };
        debug!(
            npv = result.npv,
            lcoe = ?result.lcoe,
            payback = ?result.simple_payback,
            "financial analysis complete"
        );
        Ok(result)
    }
}

/// First zero crossing of a cumulative series, interpolated between years.
fn payback_year(cumulative: &[f64]) -> Option<f64> {
    match cumulative.first() {
        Some(first) if *first >= 0.0 => return Some(0.0),
        None => return None,
        _ => {}
    }
    cumulative.windows(2).enumerate().find_map(|(year, pair)| {
        let (before, after) = (pair[0], pair[1]);
        (before < 0.0 && after >= 0.0).then(|| year as f64 + -before / (after - before))
    })
}
