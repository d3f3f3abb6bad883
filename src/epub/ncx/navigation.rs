//! NCX导航元素数据结构定义
//!
//! 定义NCX文件中的导航点、导航标签、内容引用等。

/// 文档标题
#[derive(Debug, Clone)]
pub struct DocTitle {
    /// 标题文本
    pub text: String,
}

impl DocTitle {
    /// 创建新的文档标题
    pub fn new(text: String) -> Self {
        Self { text }
    }
}

/// 导航标签
#[derive(Debug, Clone)]
pub struct NavLabel {
    /// 标签文本
    pub text: String,
}

impl NavLabel {
    /// 创建新的导航标签
    pub fn new(text: String) -> Self {
        Self { text }
    }
}

/// 导航内容引用
#[derive(Debug, Clone)]
pub struct NavContent {
    /// 源文件路径
    pub src: String,
}

impl NavContent {
    /// 创建新的导航内容引用
    pub fn new(src: String) -> Self {
        Self { src }
    }
}

/// 导航点
#[derive(Debug, Clone)]
pub struct NavPoint {
    /// 唯一标识符
    pub id: String,
    /// playOrder属性的原始值，缺失时为None
    pub play_order: Option<String>,
    /// 导航标签
    pub nav_label: NavLabel,
    /// 内容引用
    pub content: NavContent,
    /// 子导航点
    pub children: Vec<NavPoint>,
}

impl NavPoint {
    /// 创建新的导航点
    pub fn new(id: String, play_order: Option<String>) -> Self {
        Self {
            id,
            play_order,
            nav_label: NavLabel::new(String::new()),
            content: NavContent::new(String::new()),
            children: Vec::new(),
        }
    }

    /// 添加子导航点
    pub fn add_child(&mut self, child: NavPoint) {
        self.children.push(child);
    }

    /// playOrder的数值，缺失或不是十进制整数时为None
    pub fn play_order_number(&self) -> Option<u32> {
        self.play_order.as_deref()?.trim().parse().ok()
    }

    /// 获取所有导航点（包括子导航点）的平铺列表，按文档顺序
    pub fn get_all_nav_points(&self) -> Vec<&NavPoint> {
        let mut points = vec![self];
        for child in &self.children {
            points.extend(child.get_all_nav_points());
        }
        points
    }
}

/// 导航地图
#[derive(Debug, Clone, Default)]
pub struct NavMap {
    /// 导航点列表
    pub nav_points: Vec<NavPoint>,
}

impl NavMap {
    /// 创建新的导航地图
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加导航点
    pub fn add_nav_point(&mut self, nav_point: NavPoint) {
        self.nav_points.push(nav_point);
    }

    /// 获取所有导航点的平铺列表，按文档顺序
    pub fn get_all_nav_points(&self) -> Vec<&NavPoint> {
        let mut all_points = Vec::new();
        for nav_point in &self.nav_points {
            all_points.extend(nav_point.get_all_nav_points());
        }
        all_points
    }

    /// playOrder是否恰好为从1开始、按文档顺序递增的序列
    pub fn is_sequential(&self) -> bool {
        self.get_all_nav_points()
            .iter()
            .enumerate()
            .all(|(index, point)| point.play_order_number() == Some(index as u32 + 1))
    }
}
