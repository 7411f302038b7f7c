//! 已安装应用目录与应用分类
//!
//! 按包名把应用归到几类（支付、航旅、电商、餐饮预订、旅行预订、其他），写进 list_apps 的输出，
//! 帮助模型选择要启动的应用。

use serde::{Deserialize, Serialize};

/// 应用类别
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppKind {
    Payment,
    AirTravel,
    Ecommerce,
    FoodOrdering,
    TravelBooking,
    Other,
}

impl AppKind {
    pub fn label(&self) -> &'static str {
        match self {
            AppKind::Payment => "payment",
            AppKind::AirTravel => "air travel",
            AppKind::Ecommerce => "ecommerce and products",
            AppKind::FoodOrdering => "food ordering or reservations",
            AppKind::TravelBooking => "travel booking",
            AppKind::Other => "other",
        }
    }
}

/// 已安装应用及其可响应的 intent action
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub package: String,
    pub label: String,
    pub kind: AppKind,
    #[serde(default)]
    pub actions: Vec<String>,
}

impl AppInfo {
    pub fn new(package: impl Into<String>, label: impl Into<String>) -> Self {
        let package = package.into();
        Self {
            kind: classify_package(&package),
            package,
            label: label.into(),
            actions: vec!["android.intent.action.MAIN".to_string()],
        }
    }

    pub fn with_actions(mut self, actions: &[&str]) -> Self {
        self.actions = actions.iter().map(|a| a.to_string()).collect();
        self
    }
}

const PAYMENT_PACKAGES: &[&str] = &[
    "com.google.android.apps.nbu.paisa.user",
    "net.one97.paytm",
    "com.phonepe.app",
    "com.samsung.android.spay",
    "com.paypal.android.p2pmobile",
    "com.venmo",
    "com.squareup.cash",
    "com.zellepay.zelle",
    "com.eg.android.AlipayGphone",
    "com.tencent.mm",
    "com.revolut.revolut",
    "com.squareup",
    "com.myklarnamobile",
    "com.afterpaymobile",
    "com.google.android.apps.walletnfcrel",
    "com.chase.sig.android",
    "com.wf.wellsfargomobile",
    "com.infonow.bofa",
    "com.konylabs.capitalone",
    "com.citi.citimobile",
];

const AIRLINE_PACKAGES: &[&str] = &[
    "com.aa.android",
    "com.delta.mobile.android",
    "com.united.mobile.android",
    "com.southwestairlines.mobile",
    "com.ba.mobile",
    "com.lufthansa.android",
    "com.emirates.ek.android",
    "com.qatarairways.mobile",
    "com.singaporeair.app",
    "com.airfrance.android",
    "com.afklm.mobile.android",
    "com.aircanada",
    "com.alaskaairlines.android",
    "com.jetblue.JetBlueAndroid",
    "com.ryanair.cheapflights",
    "com.easyjet.mobile.android",
];

const ECOMMERCE_PACKAGES: &[&str] = &[
    "com.amazon.mShop.android.shopping",
    "com.ebay.mobile",
    "com.walmart.android",
    "com.target.ui",
    "com.alibaba.aliexpresshd",
    "com.etsy.android",
    "com.shopify.mobile",
    "com.wayfair.wayfair",
    "com.bestbuy.android",
    "com.zzkko",
    "com.ikea.kompis",
    "com.costco.app.android",
    "com.instacart.client",
    "com.temu.app",
    "com.flipkart.android",
    "com.mercadolibre",
];

const FOOD_PACKAGES: &[&str] = &[
    "com.doordash.driverapp",
    "com.ubercab.eats",
    "com.grubhub.android",
    "com.postmates.android",
    "com.seamless.android",
    "com.yelp.android",
    "com.opentable",
];

const TRAVEL_PACKAGES: &[&str] = &[
    "com.booking",
    "com.expedia.bookings",
    "com.hotels.android",
    "com.tripadvisor.tripadvisor",
    "com.kayak.android",
    "com.priceline.android.negotiator",
    "com.hotwire.hotels",
    "com.orbitz",
    "com.travelocity",
];

/// 按包名表分类；未知包名归为 Other
pub fn classify_package(package: &str) -> AppKind {
    let tables: [(&[&str], AppKind); 5] = [
        (PAYMENT_PACKAGES, AppKind::Payment),
        (AIRLINE_PACKAGES, AppKind::AirTravel),
        (ECOMMERCE_PACKAGES, AppKind::Ecommerce),
        (FOOD_PACKAGES, AppKind::FoodOrdering),
        (TRAVEL_PACKAGES, AppKind::TravelBooking),
    ];
    tables
        .iter()
        .find(|(names, _)| names.contains(&package))
        .map(|(_, kind)| *kind)
        .unwrap_or(AppKind::Other)
}
